use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a production plan.
///
/// `Draft -> Pending -> Production -> Completed`, and any non-terminal state
/// may move to `Cancelled`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PRODUCTION")]
    Production,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "DRAFT",
            PlanStatus::Pending => "PENDING",
            PlanStatus::Production => "PRODUCTION",
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Production)
                | (Production, Completed)
                | (Draft, Cancelled)
                | (Pending, Cancelled)
                | (Production, Cancelled)
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanPriority {
    #[sea_orm(string_value = "LOW")]
    Low,
    #[default]
    #[sea_orm(string_value = "MEDIUM")]
    Medium,
    #[sea_orm(string_value = "HIGH")]
    High,
    #[sea_orm(string_value = "URGENT")]
    Urgent,
}

impl std::str::FromStr for PlanPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(PlanPriority::Low),
            "MEDIUM" => Ok(PlanPriority::Medium),
            "HIGH" => Ok(PlanPriority::High),
            "URGENT" => Ok(PlanPriority::Urgent),
            other => Err(format!(
                "unknown priority '{}', expected one of LOW, MEDIUM, HIGH, URGENT",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: Option<String>,
    pub description: Option<String>,
    pub product_id: i32,
    /// Planned output in finished pieces
    pub input_quantity: i32,
    pub plan_status: PlanStatus,
    pub priority: PlanPriority,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub estimated_cost: Option<Decimal>,
    pub actual_produced_quantity: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((15, 2)))", nullable)]
    pub actual_cost: Option<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::plan_material_allocation::Entity")]
    Allocations,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::plan_material_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
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
            if model.plan_status.is_not_set() {
                model.plan_status = Set(PlanStatus::Draft);
            }
            if model.priority.is_not_set() {
                model.priority = Set(PlanPriority::default());
            }
        } else {
            model.updated_at = Set(Some(now));
        }
        Ok(model)
    }
}
