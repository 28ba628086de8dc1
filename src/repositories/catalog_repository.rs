use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder};

use super::CatalogRepository;
use crate::entities::{bom_line, material, product, warehouse};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeaOrmCatalogRepository;

#[async_trait]
impl CatalogRepository for SeaOrmCatalogRepository {
    async fn get_material(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<material::Model>, ServiceError> {
        material::Entity::find_by_id(id)
            .filter(material::Column::DeletedAt.is_null())
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn get_warehouse(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<warehouse::Model>, ServiceError> {
        warehouse::Entity::find_by_id(id)
            .filter(warehouse::Column::DeletedAt.is_null())
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn get_product(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find_by_id(id)
            .filter(product::Column::DeletedAt.is_null())
            .one(txn)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn get_bom_lines(
        &self,
        txn: &DatabaseTransaction,
        product_id: i32,
    ) -> Result<Vec<bom_line::Model>, ServiceError> {
        bom_line::Entity::find()
            .filter(bom_line::Column::ProductId.eq(product_id))
            .filter(bom_line::Column::IsActive.eq(true))
            .filter(bom_line::Column::DeletedAt.is_null())
            .order_by_asc(bom_line::Column::Id)
            .all(txn)
            .await
            .map_err(ServiceError::db_error)
    }
}
