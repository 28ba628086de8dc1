use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

/// A finished good produced from a bill of materials.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_line::Entity")]
    BomLines,
    #[sea_orm(has_many = "super::production_plan::Entity")]
    ProductionPlans,
}

impl Related<super::bom_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomLines.def()
    }
}

impl Related<super::production_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductionPlans.def()
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
        } else {
            model.updated_at = Set(Some(Utc::now()));
        }
        Ok(model)
    }
}
