use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
};

use super::PlanRepository;
use crate::entities::production_plan::{self, Column, Entity as ProductionPlan};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeaOrmPlanRepository;

#[async_trait]
impl PlanRepository for SeaOrmPlanRepository {
    async fn find_by_id(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<production_plan::Model>, ServiceError> {
        ProductionPlan::find_by_id(id)
            .filter(Column::DeletedAt.is_null())
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<production_plan::Model>, ServiceError> {
        ProductionPlan::find_by_id(id)
            .filter(Column::DeletedAt.is_null())
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn insert(
        &self,
        txn: &DatabaseTransaction,
        plan: production_plan::ActiveModel,
    ) -> Result<production_plan::Model, ServiceError> {
        plan.insert(txn).await.map_err(ServiceError::db_error)
    }

    async fn update(
        &self,
        txn: &DatabaseTransaction,
        plan: production_plan::ActiveModel,
    ) -> Result<production_plan::Model, ServiceError> {
        plan.update(txn).await.map_err(ServiceError::db_error)
    }

    async fn soft_delete(&self, txn: &DatabaseTransaction, id: i32) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let result = ProductionPlan::update_many()
            .col_expr(Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(Column::UpdatedAt, Expr::value(Some(now)))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_null())
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected > 0)
    }

    async fn restore(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<production_plan::Model>, ServiceError> {
        let result = ProductionPlan::update_many()
            .col_expr(Column::DeletedAt, Expr::value(Option::<chrono::DateTime<Utc>>::None))
            .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_not_null())
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(txn, id).await
    }
}
