use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};

use super::AllocationRepository;
use crate::entities::plan_material_allocation::{
    self, ActiveModel, Column, Entity as PlanMaterialAllocation,
};
use crate::errors::ServiceError;

/// Allocation row to be written at confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAllocation {
    pub plan_id: i32,
    pub material_id: i32,
    pub warehouse_id: i32,
    pub inventory_id: i32,
    pub allocated_quantity: Decimal,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeaOrmAllocationRepository;

#[async_trait]
impl AllocationRepository for SeaOrmAllocationRepository {
    async fn find_by_plan(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<Vec<plan_material_allocation::Model>, ServiceError> {
        PlanMaterialAllocation::find()
            .filter(Column::PlanId.eq(plan_id))
            .order_by_asc(Column::Id)
            .all(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn delete_by_plan(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<u64, ServiceError> {
        let result = PlanMaterialAllocation::delete_many()
            .filter(Column::PlanId.eq(plan_id))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected)
    }

    async fn insert(
        &self,
        txn: &DatabaseTransaction,
        allocation: NewAllocation,
    ) -> Result<plan_material_allocation::Model, ServiceError> {
        ActiveModel {
            plan_id: Set(allocation.plan_id),
            material_id: Set(allocation.material_id),
            warehouse_id: Set(allocation.warehouse_id),
            inventory_id: Set(allocation.inventory_id),
            allocated_quantity: Set(allocation.allocated_quantity),
            unit_cost: Set(allocation.unit_cost),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)
    }

    async fn record_usage(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
        used_quantity: Decimal,
        returned_quantity: Decimal,
    ) -> Result<(), ServiceError> {
        let result = PlanMaterialAllocation::update_many()
            .col_expr(Column::UsedQuantity, Expr::value(used_quantity))
            .col_expr(Column::ReturnedQuantity, Expr::value(returned_quantity))
            .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(Column::Id.eq(id))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Allocation", id));
        }
        Ok(())
    }
}
