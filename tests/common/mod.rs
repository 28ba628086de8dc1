#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tokio::sync::mpsc;

use production_planner::{
    db::{self, DbConfig},
    entities::{
        bom_line, material, material_inventory, plan_material_allocation, product,
        production_plan, PlanStatus,
    },
    events::{self, PlanEvent},
    services::{NewPlan, PlanService, PlanWorkflowService, StockReservationService},
    repositories::Repositories,
    AppServices,
};

/// Harness around a migrated in-memory SQLite database.
///
/// The pool holds a single connection, so every transaction is serialized
/// and the in-memory database lives as long as the harness.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub events: mpsc::Receiver<PlanEvent>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_low_stock_alerts(true).await
    }

    pub async fn with_low_stock_alerts(enabled: bool) -> Self {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout: None,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let db = Arc::new(pool);
        let (sender, events) = events::channel(64);
        let services = AppServices::new(db.clone(), Some(sender), enabled);

        Self {
            db,
            services,
            events,
        }
    }

    pub fn plans(&self) -> &PlanService {
        &self.services.plans
    }

    pub fn workflow(&self) -> &PlanWorkflowService {
        &self.services.workflow
    }

    pub fn stock(&self) -> StockReservationService {
        StockReservationService::new(self.db.clone(), Repositories::sea_orm().inventory)
    }

    /// Events published so far, in publication order.
    pub fn drain_events(&mut self) -> Vec<PlanEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn material(&self, name: &str, cost_per_unit: Decimal, min_stock: Decimal) -> material::Model {
        material::ActiveModel {
            name: Set(name.to_string()),
            code: Set(Some(name.to_uppercase())),
            unit_id: Set(None),
            cost_per_unit: Set(cost_per_unit),
            min_stock: Set(min_stock),
            is_active: Set(true),
            updated_at: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert material")
    }

    pub async fn warehouse(&self, name: &str) -> production_planner::entities::warehouse::Model {
        self.warehouse_with_status(name, true).await
    }

    pub async fn warehouse_with_status(
        &self,
        name: &str,
        is_active: bool,
    ) -> production_planner::entities::warehouse::Model {
        production_planner::entities::warehouse::ActiveModel {
            name: Set(name.to_string()),
            location: Set(None),
            is_active: Set(is_active),
            updated_at: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert warehouse")
    }

    pub async fn product(&self, name: &str) -> product::Model {
        product::ActiveModel {
            name: Set(name.to_string()),
            code: Set(None),
            is_active: Set(true),
            updated_at: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert product")
    }

    pub async fn bom_line(
        &self,
        product_id: i32,
        material_id: i32,
        usage_per_piece: Decimal,
        scrap_factor: Option<Decimal>,
    ) -> bom_line::Model {
        bom_line::ActiveModel {
            product_id: Set(product_id),
            material_id: Set(material_id),
            usage_per_piece: Set(usage_per_piece),
            scrap_factor: Set(scrap_factor),
            unit_id: Set(None),
            version: Set(1),
            is_active: Set(true),
            updated_at: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert bom line")
    }

    pub async fn inventory(
        &self,
        material_id: i32,
        warehouse_id: i32,
        quantity: i64,
        reserved_quantity: i64,
    ) -> material_inventory::Model {
        material_inventory::ActiveModel {
            material_id: Set(material_id),
            warehouse_id: Set(warehouse_id),
            quantity: Set(quantity),
            reserved_quantity: Set(reserved_quantity),
            order_number: Set(None),
            mfg_date: Set(None),
            exp_date: Set(None),
            updated_at: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert inventory")
    }

    /// Creates a DRAFT plan through the service.
    pub async fn draft_plan(&self, product_id: i32, input_quantity: i32) -> production_plan::Model {
        self.plans()
            .create_plan(NewPlan {
                name: Some(format!("plan for product {}", product_id)),
                product_id,
                input_quantity,
                ..Default::default()
            })
            .await
            .expect("create plan")
    }

    /// `(quantity, reserved_quantity)` of an inventory row.
    pub async fn levels(&self, inventory_id: i32) -> (i64, i64) {
        let row = material_inventory::Entity::find_by_id(inventory_id)
            .one(self.db.as_ref())
            .await
            .expect("load inventory")
            .expect("inventory row exists");
        (row.quantity, row.reserved_quantity)
    }

    pub async fn plan_status(&self, plan_id: i32) -> PlanStatus {
        production_plan::Entity::find_by_id(plan_id)
            .one(self.db.as_ref())
            .await
            .expect("load plan")
            .expect("plan row exists")
            .plan_status
    }

    pub async fn allocation_count(&self, plan_id: i32) -> usize {
        use sea_orm::{ColumnTrait, QueryFilter};
        plan_material_allocation::Entity::find()
            .filter(plan_material_allocation::Column::PlanId.eq(plan_id))
            .all(self.db.as_ref())
            .await
            .expect("load allocations")
            .len()
    }
}

/// Single-material fixture: one product needing `usage` of one material per
/// piece, stocked in one warehouse.
pub struct SimpleBom {
    pub product: product::Model,
    pub material: material::Model,
    pub warehouse: production_planner::entities::warehouse::Model,
    pub inventory: material_inventory::Model,
}

impl TestApp {
    pub async fn simple_bom(
        &self,
        usage: Decimal,
        scrap: Option<Decimal>,
        cost: Decimal,
        on_hand: i64,
    ) -> SimpleBom {
        let product = self.product("Widget").await;
        let material = self.material("steel", cost, Decimal::ZERO).await;
        let warehouse = self.warehouse("Main").await;
        self.bom_line(product.id, material.id, usage, scrap).await;
        let inventory = self.inventory(material.id, warehouse.id, on_hand, 0).await;
        SimpleBom {
            product,
            material,
            warehouse,
            inventory,
        }
    }
}
