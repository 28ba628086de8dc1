use sea_orm::DbBackend;
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_bom_lines_table::Migration),
            Box::new(m20240301_000003_create_material_inventory_table::Migration),
            Box::new(m20240301_000004_create_production_plans_table::Migration),
            Box::new(m20240301_000005_create_plan_material_allocations_table::Migration),
        ]
    }
}

/// Fixed-point column on Postgres. SQLite has no decimal storage class and
/// sea-orm binds `Decimal` as a float there, so the column is REAL.
fn decimal_column<T: IntoIden>(
    backend: DbBackend,
    name: T,
    precision: u32,
    scale: u32,
) -> ColumnDef {
    let mut def = ColumnDef::new(name);
    match backend {
        DbBackend::Sqlite => def.double(),
        _ => def.decimal_len(precision, scale),
    };
    def
}

fn created_at<T: IntoIden>(name: T) -> ColumnDef {
    let mut def = ColumnDef::new(name);
    def.timestamp_with_time_zone().not_null();
    def
}

fn nullable_timestamp<T: IntoIden>(name: T) -> ColumnDef {
    let mut def = ColumnDef::new(name);
    def.timestamp_with_time_zone().null();
    def
}

fn id_column<T: IntoIden>(name: T) -> ColumnDef {
    let mut def = ColumnDef::new(name);
    def.integer().not_null().auto_increment().primary_key();
    def
}

mod m20240301_000001_create_catalog_tables {
    use super::{created_at, decimal_column, id_column, nullable_timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(id_column(Materials::Id))
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::Code).string_len(64).null())
                        .col(ColumnDef::new(Materials::UnitId).integer().null())
                        .col(
                            decimal_column(backend, Materials::CostPerUnit, 15, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            decimal_column(backend, Materials::MinStock, 15, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Materials::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(created_at(Materials::CreatedAt))
                        .col(nullable_timestamp(Materials::UpdatedAt))
                        .col(nullable_timestamp(Materials::DeletedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(id_column(Warehouses::Id))
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::Location).string().null())
                        .col(
                            ColumnDef::new(Warehouses::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(created_at(Warehouses::CreatedAt))
                        .col(nullable_timestamp(Warehouses::UpdatedAt))
                        .col(nullable_timestamp(Warehouses::DeletedAt))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(id_column(Products::Id))
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Code).string_len(64).null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(created_at(Products::CreatedAt))
                        .col(nullable_timestamp(Products::UpdatedAt))
                        .col(nullable_timestamp(Products::DeletedAt))
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Materials {
        Table,
        Id,
        Name,
        Code,
        UnitId,
        CostPerUnit,
        MinStock,
        IsActive,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum Warehouses {
        Table,
        Id,
        Name,
        Location,
        IsActive,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum Products {
        Table,
        Id,
        Name,
        Code,
        IsActive,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }
}

mod m20240301_000002_create_bom_lines_table {
    use super::m20240301_000001_create_catalog_tables::{Materials, Products};
    use super::{created_at, decimal_column, id_column, nullable_timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_bom_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(BomLines::Table)
                        .if_not_exists()
                        .col(id_column(BomLines::Id))
                        .col(ColumnDef::new(BomLines::ProductId).integer().not_null())
                        .col(ColumnDef::new(BomLines::MaterialId).integer().not_null())
                        .col(decimal_column(backend, BomLines::UsagePerPiece, 15, 4).not_null())
                        .col(decimal_column(backend, BomLines::ScrapFactor, 8, 4).null())
                        .col(ColumnDef::new(BomLines::UnitId).integer().null())
                        .col(
                            ColumnDef::new(BomLines::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(BomLines::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(created_at(BomLines::CreatedAt))
                        .col(nullable_timestamp(BomLines::UpdatedAt))
                        .col(nullable_timestamp(BomLines::DeletedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_product_id")
                                .from(BomLines::Table, BomLines::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bom_lines_material_id")
                                .from(BomLines::Table, BomLines::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bom_lines_product_id")
                        .table(BomLines::Table)
                        .col(BomLines::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BomLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BomLines {
        Table,
        Id,
        ProductId,
        MaterialId,
        UsagePerPiece,
        ScrapFactor,
        UnitId,
        Version,
        IsActive,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }
}

mod m20240301_000003_create_material_inventory_table {
    use super::m20240301_000001_create_catalog_tables::{Materials, Warehouses};
    use super::{created_at, id_column, nullable_timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_material_inventory_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MaterialInventory::Table)
                        .if_not_exists()
                        .col(id_column(MaterialInventory::Id))
                        .col(
                            ColumnDef::new(MaterialInventory::MaterialId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialInventory::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MaterialInventory::Quantity)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialInventory::ReservedQuantity)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MaterialInventory::OrderNumber)
                                .string_len(64)
                                .null(),
                        )
                        .col(ColumnDef::new(MaterialInventory::MfgDate).date().null())
                        .col(ColumnDef::new(MaterialInventory::ExpDate).date().null())
                        .col(created_at(MaterialInventory::CreatedAt))
                        .col(nullable_timestamp(MaterialInventory::UpdatedAt))
                        .col(nullable_timestamp(MaterialInventory::DeletedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_material_inventory_material_id")
                                .from(MaterialInventory::Table, MaterialInventory::MaterialId)
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_material_inventory_warehouse_id")
                                .from(MaterialInventory::Table, MaterialInventory::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_material_inventory_material_warehouse")
                        .table(MaterialInventory::Table)
                        .col(MaterialInventory::MaterialId)
                        .col(MaterialInventory::WarehouseId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MaterialInventory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum MaterialInventory {
        Table,
        Id,
        MaterialId,
        WarehouseId,
        Quantity,
        ReservedQuantity,
        OrderNumber,
        MfgDate,
        ExpDate,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }
}

mod m20240301_000004_create_production_plans_table {
    use super::m20240301_000001_create_catalog_tables::Products;
    use super::{created_at, decimal_column, id_column, nullable_timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_production_plans_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(ProductionPlans::Table)
                        .if_not_exists()
                        .col(id_column(ProductionPlans::Id))
                        .col(ColumnDef::new(ProductionPlans::Name).string().null())
                        .col(ColumnDef::new(ProductionPlans::Description).text().null())
                        .col(
                            ColumnDef::new(ProductionPlans::ProductId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionPlans::InputQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionPlans::PlanStatus)
                                .string_len(20)
                                .not_null()
                                .default("DRAFT"),
                        )
                        .col(
                            ColumnDef::new(ProductionPlans::Priority)
                                .string_len(20)
                                .not_null()
                                .default("MEDIUM"),
                        )
                        .col(ColumnDef::new(ProductionPlans::StartDate).date().null())
                        .col(ColumnDef::new(ProductionPlans::EndDate).date().null())
                        .col(decimal_column(backend, ProductionPlans::EstimatedCost, 15, 2).null())
                        .col(
                            ColumnDef::new(ProductionPlans::ActualProducedQuantity)
                                .integer()
                                .null(),
                        )
                        .col(decimal_column(backend, ProductionPlans::ActualCost, 15, 2).null())
                        .col(nullable_timestamp(ProductionPlans::StartedAt))
                        .col(nullable_timestamp(ProductionPlans::CompletedAt))
                        .col(nullable_timestamp(ProductionPlans::CancelledAt))
                        .col(ColumnDef::new(ProductionPlans::CancelReason).text().null())
                        .col(created_at(ProductionPlans::CreatedAt))
                        .col(nullable_timestamp(ProductionPlans::UpdatedAt))
                        .col(nullable_timestamp(ProductionPlans::DeletedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_plans_product_id")
                                .from(ProductionPlans::Table, ProductionPlans::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_plans_status")
                        .table(ProductionPlans::Table)
                        .col(ProductionPlans::PlanStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductionPlans::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum ProductionPlans {
        Table,
        Id,
        Name,
        Description,
        ProductId,
        InputQuantity,
        PlanStatus,
        Priority,
        StartDate,
        EndDate,
        EstimatedCost,
        ActualProducedQuantity,
        ActualCost,
        StartedAt,
        CompletedAt,
        CancelledAt,
        CancelReason,
        CreatedAt,
        UpdatedAt,
        DeletedAt,
    }
}

mod m20240301_000005_create_plan_material_allocations_table {
    use super::m20240301_000001_create_catalog_tables::{Materials, Warehouses};
    use super::m20240301_000003_create_material_inventory_table::MaterialInventory;
    use super::m20240301_000004_create_production_plans_table::ProductionPlans;
    use super::{created_at, decimal_column, id_column, nullable_timestamp};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_plan_material_allocations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(PlanMaterialAllocations::Table)
                        .if_not_exists()
                        .col(id_column(PlanMaterialAllocations::Id))
                        .col(
                            ColumnDef::new(PlanMaterialAllocations::PlanId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PlanMaterialAllocations::MaterialId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PlanMaterialAllocations::WarehouseId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PlanMaterialAllocations::InventoryId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            decimal_column(backend, PlanMaterialAllocations::AllocatedQuantity, 15, 3)
                                .not_null(),
                        )
                        .col(
                            decimal_column(backend, PlanMaterialAllocations::UsedQuantity, 15, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            decimal_column(backend, PlanMaterialAllocations::ReturnedQuantity, 15, 3)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            decimal_column(backend, PlanMaterialAllocations::UnitCost, 15, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(created_at(PlanMaterialAllocations::CreatedAt))
                        .col(nullable_timestamp(PlanMaterialAllocations::UpdatedAt))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_plan_material_allocations_plan_id")
                                .from(PlanMaterialAllocations::Table, PlanMaterialAllocations::PlanId)
                                .to(ProductionPlans::Table, ProductionPlans::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_plan_material_allocations_inventory_id")
                                .from(
                                    PlanMaterialAllocations::Table,
                                    PlanMaterialAllocations::InventoryId,
                                )
                                .to(MaterialInventory::Table, MaterialInventory::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_plan_material_allocations_material_id")
                                .from(
                                    PlanMaterialAllocations::Table,
                                    PlanMaterialAllocations::MaterialId,
                                )
                                .to(Materials::Table, Materials::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_plan_material_allocations_warehouse_id")
                                .from(
                                    PlanMaterialAllocations::Table,
                                    PlanMaterialAllocations::WarehouseId,
                                )
                                .to(Warehouses::Table, Warehouses::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_plan_material_allocations_plan_id")
                        .table(PlanMaterialAllocations::Table)
                        .col(PlanMaterialAllocations::PlanId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(PlanMaterialAllocations::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PlanMaterialAllocations {
        Table,
        Id,
        PlanId,
        MaterialId,
        WarehouseId,
        InventoryId,
        AllocatedQuantity,
        UsedQuantity,
        ReturnedQuantity,
        UnitCost,
        CreatedAt,
        UpdatedAt,
    }
}
