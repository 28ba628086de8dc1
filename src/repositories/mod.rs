//! Data access behind explicit interfaces.
//!
//! Every method takes the caller's transaction so that a workflow transition
//! can compose reads, row locks and writes into a single unit of work.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use std::sync::Arc;

use crate::entities::{
    bom_line, material, material_inventory, plan_material_allocation, product, production_plan,
    warehouse,
};
use crate::errors::ServiceError;

pub mod allocation_repository;
pub mod catalog_repository;
pub mod inventory_repository;
pub mod plan_repository;

pub use allocation_repository::{NewAllocation, SeaOrmAllocationRepository};
pub use catalog_repository::SeaOrmCatalogRepository;
pub use inventory_repository::SeaOrmInventoryRepository;
pub use plan_repository::SeaOrmPlanRepository;

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Loads a live inventory row and holds a write lock on it until the
    /// transaction ends.
    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<material_inventory::Model>, ServiceError>;

    async fn find_by_id(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<material_inventory::Model>, ServiceError>;

    /// First live row (lowest id) stocking `material_id` in `warehouse_id`.
    async fn find_by_material_and_warehouse(
        &self,
        txn: &DatabaseTransaction,
        material_id: i32,
        warehouse_id: i32,
    ) -> Result<Option<material_inventory::Model>, ServiceError>;

    /// Live rows of a material with stock left to reserve in an active
    /// warehouse, paired with that warehouse and ordered by its name.
    async fn list_available_by_material(
        &self,
        txn: &DatabaseTransaction,
        material_id: i32,
    ) -> Result<Vec<(material_inventory::Model, warehouse::Model)>, ServiceError>;

    async fn save_levels(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
        quantity: i64,
        reserved_quantity: i64,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AllocationRepository: Send + Sync {
    async fn find_by_plan(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<Vec<plan_material_allocation::Model>, ServiceError>;

    /// Removes every allocation of a plan, returning how many were deleted.
    async fn delete_by_plan(&self, txn: &DatabaseTransaction, plan_id: i32)
        -> Result<u64, ServiceError>;

    async fn insert(
        &self,
        txn: &DatabaseTransaction,
        allocation: NewAllocation,
    ) -> Result<plan_material_allocation::Model, ServiceError>;

    async fn record_usage(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
        used_quantity: Decimal,
        returned_quantity: Decimal,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Soft-deleted plans are not returned.
    async fn find_by_id(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<production_plan::Model>, ServiceError>;

    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<production_plan::Model>, ServiceError>;

    async fn insert(
        &self,
        txn: &DatabaseTransaction,
        plan: production_plan::ActiveModel,
    ) -> Result<production_plan::Model, ServiceError>;

    async fn update(
        &self,
        txn: &DatabaseTransaction,
        plan: production_plan::ActiveModel,
    ) -> Result<production_plan::Model, ServiceError>;

    /// Returns `false` when no live plan had that id.
    async fn soft_delete(&self, txn: &DatabaseTransaction, id: i32) -> Result<bool, ServiceError>;

    /// Clears `deleted_at`. `None` when no deleted plan had that id.
    async fn restore(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<production_plan::Model>, ServiceError>;
}

/// Read access to materials, warehouses, products and their BOMs.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_material(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<material::Model>, ServiceError>;

    async fn get_warehouse(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<warehouse::Model>, ServiceError>;

    async fn get_product(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<product::Model>, ServiceError>;

    /// Active, live BOM lines of a product in insertion order.
    async fn get_bom_lines(
        &self,
        txn: &DatabaseTransaction,
        product_id: i32,
    ) -> Result<Vec<bom_line::Model>, ServiceError>;
}

/// The repository set injected into services.
#[derive(Clone)]
pub struct Repositories {
    pub inventory: Arc<dyn InventoryRepository>,
    pub allocations: Arc<dyn AllocationRepository>,
    pub plans: Arc<dyn PlanRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
}

impl Repositories {
    /// Sea-orm backed implementations of every repository.
    pub fn sea_orm() -> Self {
        Self {
            inventory: Arc::new(SeaOrmInventoryRepository),
            allocations: Arc::new(SeaOrmAllocationRepository),
            plans: Arc::new(SeaOrmPlanRepository),
            catalog: Arc::new(SeaOrmCatalogRepository),
        }
    }
}

impl Default for Repositories {
    fn default() -> Self {
        Self::sea_orm()
    }
}
