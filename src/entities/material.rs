use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// A raw material that can be stocked and consumed by production.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub code: Option<String>,
    pub unit_id: Option<i32>,
    /// Current purchase cost; allocations snapshot it at confirmation.
    #[sea_orm(column_type = "Decimal(Some((15, 2)))")]
    pub cost_per_unit: Decimal,
    /// Available stock at or below this level raises a low stock alert.
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub min_stock: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::material_inventory::Entity")]
    MaterialInventory,
    #[sea_orm(has_many = "super::bom_line::Entity")]
    BomLines,
}

impl Related<super::material_inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaterialInventory.def()
    }
}

impl Related<super::bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLines.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = self;
        let now = Utc::now();
        if insert {
            model.created_at = Set(now);
        } else {
            model.updated_at = Set(Some(now));
        }
        Ok(model)
    }
}
