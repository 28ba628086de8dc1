use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::debug;

use super::InventoryRepository;
use crate::entities::material_inventory::{self, Column, Entity as MaterialInventory};
use crate::entities::warehouse;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeaOrmInventoryRepository;

#[async_trait]
impl InventoryRepository for SeaOrmInventoryRepository {
    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<material_inventory::Model>, ServiceError> {
        debug!(inventory_id = id, "Locking inventory row");
        MaterialInventory::find_by_id(id)
            .filter(Column::DeletedAt.is_null())
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_id(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<material_inventory::Model>, ServiceError> {
        MaterialInventory::find_by_id(id)
            .filter(Column::DeletedAt.is_null())
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_material_and_warehouse(
        &self,
        txn: &DatabaseTransaction,
        material_id: i32,
        warehouse_id: i32,
    ) -> Result<Option<material_inventory::Model>, ServiceError> {
        MaterialInventory::find()
            .filter(Column::MaterialId.eq(material_id))
            .filter(Column::WarehouseId.eq(warehouse_id))
            .filter(Column::DeletedAt.is_null())
            .order_by_asc(Column::Id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_available_by_material(
        &self,
        txn: &DatabaseTransaction,
        material_id: i32,
    ) -> Result<Vec<(material_inventory::Model, warehouse::Model)>, ServiceError> {
        let rows = MaterialInventory::find()
            .find_also_related(warehouse::Entity)
            .filter(Column::MaterialId.eq(material_id))
            .filter(Column::DeletedAt.is_null())
            .filter(warehouse::Column::DeletedAt.is_null())
            .filter(warehouse::Column::IsActive.eq(true))
            .order_by_asc(warehouse::Column::Name)
            .order_by_asc(Column::Id)
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|(inventory, warehouse)| warehouse.map(|w| (inventory, w)))
            .filter(|(inventory, _)| inventory.available() > 0)
            .collect())
    }

    async fn save_levels(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
        quantity: i64,
        reserved_quantity: i64,
    ) -> Result<(), ServiceError> {
        let result = MaterialInventory::update_many()
            .col_expr(Column::Quantity, Expr::value(quantity))
            .col_expr(Column::ReservedQuantity, Expr::value(reserved_quantity))
            .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(Column::Id.eq(id))
            .exec(txn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Inventory", id));
        }
        Ok(())
    }
}
