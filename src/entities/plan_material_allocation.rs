use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// Reservation of one inventory row for one plan, and how much of it was
/// consumed or handed back once production ended.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plan_material_allocations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub plan_id: i32,
    pub material_id: i32,
    pub warehouse_id: i32,
    pub inventory_id: i32,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub allocated_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub used_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((15, 3)))")]
    pub returned_quantity: Decimal,
    /// Material cost at confirmation time. Never updated afterwards.
    #[sea_orm(column_type = "Decimal(Some((15, 2)))")]
    pub unit_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production_plan::Entity",
        from = "Column::PlanId",
        to = "super::production_plan::Column::Id",
        on_delete = "Cascade"
    )]
    Plan,
    #[sea_orm(
        belongs_to = "super::material_inventory::Entity",
        from = "Column::InventoryId",
        to = "super::material_inventory::Column::Id"
    )]
    Inventory,
}

impl Related<super::production_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl Related<super::material_inventory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inventory.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = self;
        if insert {
            model.created_at = Set(Utc::now());
            if model.used_quantity.is_not_set() {
                model.used_quantity = Set(Decimal::ZERO);
            }
            if model.returned_quantity.is_not_set() {
                model.returned_quantity = Set(Decimal::ZERO);
            }
        } else {
            model.updated_at = Set(Some(Utc::now()));
        }
        Ok(model)
    }
}
