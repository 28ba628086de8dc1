use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    common::{from_stock_units, ratio, round_cost, round_quantity, to_stock_units},
    db,
    entities::{material, plan_material_allocation, production_plan, PlanStatus},
    errors::ServiceError,
    events::{EventSender, PlanEvent},
    repositories::{NewAllocation, Repositories},
    services::{
        bom_calculator::{BomCalculator, MaterialRequirement},
        stock_reservation::{StockMovement, StockOperation, StockReservationService},
    },
};

/// Caller-chosen source of material for a plan: take `quantity` of
/// `material_id` from `warehouse_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationInput {
    pub material_id: i32,
    pub warehouse_id: i32,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CancelPlanRequest {
    #[validate(length(min = 1, message = "Cancel reason is required"))]
    pub reason: String,
    /// Required when cancelling a plan that is in production
    #[validate(range(min = 0))]
    pub actual_produced_quantity: Option<i32>,
}

/// A plan together with its allocation ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanAggregate {
    pub plan: production_plan::Model,
    pub allocations: Vec<plan_material_allocation::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseStock {
    pub inventory_id: i32,
    pub warehouse_id: i32,
    pub warehouse_name: String,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewMaterial {
    #[serde(flatten)]
    pub requirement: MaterialRequirement,
    pub material_name: String,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub stock_by_warehouse: Vec<WarehouseStock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanPreview {
    pub plan_id: i32,
    pub product_id: i32,
    pub input_quantity: i32,
    pub materials: Vec<PreviewMaterial>,
    pub estimated_cost: Decimal,
}

/// Used and returned amounts of one allocation once production ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaterialUsage {
    pub allocation_id: i32,
    pub inventory_id: i32,
    pub used_quantity: Decimal,
    pub returned_quantity: Decimal,
}

/// Splits every allocation by the produced/planned ratio.
///
/// `used = round(allocated * ratio, 3)`, `returned = round(allocated - used, 3)`
/// and the cost is `round(sum(used * unit_cost), 2)`.
pub fn calculate_material_usage(
    allocations: &[plan_material_allocation::Model],
    ratio: Decimal,
) -> (Vec<MaterialUsage>, Decimal) {
    let mut cost = Decimal::ZERO;
    let usages = allocations
        .iter()
        .map(|allocation| {
            let used = round_quantity(allocation.allocated_quantity * ratio);
            let returned = round_quantity(allocation.allocated_quantity - used);
            cost += used * allocation.unit_cost;
            MaterialUsage {
                allocation_id: allocation.id,
                inventory_id: allocation.inventory_id,
                used_quantity: used,
                returned_quantity: returned,
            }
        })
        .collect();
    (usages, round_cost(cost))
}

/// Drives a production plan through its lifecycle.
///
/// Each transition runs in one database transaction: stock movements,
/// allocation writes and the status change commit together or not at all.
/// Events go out only after a successful commit.
#[derive(Clone)]
pub struct PlanWorkflowService {
    db: Arc<DatabaseConnection>,
    repos: Repositories,
    calculator: BomCalculator,
    stock: StockReservationService,
    event_sender: Option<EventSender>,
    low_stock_alerts: bool,
}

impl PlanWorkflowService {
    pub fn new(db: Arc<DatabaseConnection>, repos: Repositories) -> Self {
        let calculator = BomCalculator::new(repos.catalog.clone());
        let stock = StockReservationService::new(db.clone(), repos.inventory.clone());
        Self {
            db,
            repos,
            calculator,
            stock,
            event_sender: None,
            low_stock_alerts: true,
        }
    }

    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn with_low_stock_alerts(mut self, enabled: bool) -> Self {
        self.low_stock_alerts = enabled;
        self
    }

    pub fn stock(&self) -> &StockReservationService {
        &self.stock
    }

    /// Material requirements, costs and stock per warehouse for a plan.
    /// Nothing is written.
    #[instrument(skip(self))]
    pub async fn preview_plan(&self, plan_id: i32) -> Result<PlanPreview, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.preview_in(&txn, plan_id).await;
        db::finish(txn, "preview_plan", result).await
    }

    /// DRAFT -> PENDING. Reserves the allocated stock and writes the
    /// allocation ledger. Allocations from an earlier failed attempt are
    /// discarded first.
    #[instrument(skip(self, allocations), fields(allocations = allocations.len()))]
    pub async fn confirm_plan(
        &self,
        plan_id: i32,
        allocations: Vec<AllocationInput>,
    ) -> Result<PlanAggregate, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.confirm_in(&txn, plan_id, &allocations).await;
        let (aggregate, low_stock) =
            transition_outcome("confirm", db::finish(txn, "confirm_plan", result).await)?;

        counter!("production_plans.confirmed", 1);
        info!(
            plan_id,
            allocations = aggregate.allocations.len(),
            estimated_cost = ?aggregate.plan.estimated_cost,
            "Production plan confirmed"
        );

        self.publish(PlanEvent::PlanConfirmed {
            plan_id,
            allocation_count: aggregate.allocations.len(),
            estimated_cost: aggregate.plan.estimated_cost.unwrap_or_default(),
            at: Utc::now(),
        })
        .await;
        for event in low_stock {
            self.publish(event).await;
        }

        Ok(aggregate)
    }

    /// PENDING -> PRODUCTION. Deducts every allocation from on-hand stock.
    #[instrument(skip(self))]
    pub async fn start_production(&self, plan_id: i32) -> Result<PlanAggregate, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.start_in(&txn, plan_id).await;
        let aggregate =
            transition_outcome("start", db::finish(txn, "start_production", result).await)?;

        counter!("production_plans.started", 1);
        info!(plan_id, "Production started");
        self.publish(PlanEvent::ProductionStarted {
            plan_id,
            at: Utc::now(),
        })
        .await;

        Ok(aggregate)
    }

    /// PRODUCTION -> COMPLETED. Records usage in proportion to the produced
    /// quantity and returns the remainder to stock.
    #[instrument(skip(self))]
    pub async fn complete_plan(
        &self,
        plan_id: i32,
        actual_produced_quantity: i32,
    ) -> Result<PlanAggregate, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self
            .complete_in(&txn, plan_id, actual_produced_quantity)
            .await;
        let aggregate =
            transition_outcome("complete", db::finish(txn, "complete_plan", result).await)?;

        counter!("production_plans.completed", 1);
        info!(
            plan_id,
            actual_produced_quantity,
            actual_cost = ?aggregate.plan.actual_cost,
            "Production plan completed"
        );
        self.publish(PlanEvent::PlanCompleted {
            plan_id,
            actual_produced_quantity,
            actual_cost: aggregate.plan.actual_cost.unwrap_or_default(),
            at: Utc::now(),
        })
        .await;

        Ok(aggregate)
    }

    /// Any non-terminal state -> CANCELLED.
    ///
    /// A pending plan gets its reservations released. A plan in production
    /// is settled like a completion for the quantity actually produced.
    #[instrument(skip(self, request), fields(reason = %request.reason))]
    pub async fn cancel_plan(
        &self,
        plan_id: i32,
        request: CancelPlanRequest,
    ) -> Result<PlanAggregate, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.cancel_in(&txn, plan_id, &request).await;
        let aggregate = transition_outcome("cancel", db::finish(txn, "cancel_plan", result).await)?;

        counter!("production_plans.cancelled", 1);
        info!(plan_id, reason = %request.reason, "Production plan cancelled");
        self.publish(PlanEvent::PlanCancelled {
            plan_id,
            reason: request.reason.trim().to_string(),
            at: Utc::now(),
        })
        .await;

        Ok(aggregate)
    }

    async fn publish(&self, event: PlanEvent) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    async fn preview_in(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<PlanPreview, ServiceError> {
        let plan = self.load_plan(txn, plan_id, false).await?;
        let requirements = self
            .calculator
            .calculate(txn, plan.product_id, plan.input_quantity)
            .await?;

        let mut estimated = Decimal::ZERO;
        let mut materials = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let material = self.material(txn, requirement.material_id).await?;
            let total = requirement.required_quantity * material.cost_per_unit;
            estimated += total;

            let stock_by_warehouse = self
                .repos
                .inventory
                .list_available_by_material(txn, requirement.material_id)
                .await?
                .into_iter()
                .map(|(inventory, warehouse)| WarehouseStock {
                    inventory_id: inventory.id,
                    warehouse_id: warehouse.id,
                    warehouse_name: warehouse.name,
                    quantity: inventory.quantity,
                    reserved_quantity: inventory.reserved_quantity,
                    available_quantity: inventory.available(),
                })
                .collect();

            materials.push(PreviewMaterial {
                requirement,
                material_name: material.name,
                unit_cost: material.cost_per_unit,
                total_cost: round_cost(total),
                stock_by_warehouse,
            });
        }

        Ok(PlanPreview {
            plan_id: plan.id,
            product_id: plan.product_id,
            input_quantity: plan.input_quantity,
            materials,
            estimated_cost: round_cost(estimated),
        })
    }

    async fn confirm_in(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
        allocations: &[AllocationInput],
    ) -> Result<(PlanAggregate, Vec<PlanEvent>), ServiceError> {
        let plan = self.load_plan(txn, plan_id, true).await?;
        ensure_status(&plan, PlanStatus::Draft, "confirm")?;

        for allocation in allocations {
            if allocation.quantity <= Decimal::ZERO {
                return Err(ServiceError::InvalidInput(format!(
                    "Allocation quantity for material {} in warehouse {} must be positive",
                    allocation.material_id, allocation.warehouse_id
                )));
            }
        }

        let removed = self.repos.allocations.delete_by_plan(txn, plan.id).await?;
        if removed > 0 {
            warn!(plan_id, removed, "Discarded stale allocations of draft plan");
        }

        let requirements = self
            .calculator
            .calculate(txn, plan.product_id, plan.input_quantity)
            .await?;
        validate_allocations(&requirements, allocations)?;

        let mut materials: HashMap<i32, material::Model> = HashMap::new();
        let mut operations = Vec::with_capacity(allocations.len());
        let mut pending = Vec::with_capacity(allocations.len());

        for allocation in allocations {
            let quantity = round_quantity(allocation.quantity);
            let warehouse = self
                .repos
                .catalog
                .get_warehouse(txn, allocation.warehouse_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Warehouse", allocation.warehouse_id))?;
            if !warehouse.is_active {
                return Err(ServiceError::InvalidInput(format!(
                    "Warehouse {} is inactive",
                    warehouse.id
                )));
            }

            let inventory = self
                .repos
                .inventory
                .find_by_material_and_warehouse(txn, allocation.material_id, allocation.warehouse_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "No inventory for material {} in warehouse {}",
                        allocation.material_id, allocation.warehouse_id
                    ))
                })?;

            if inventory.available() < to_stock_units(quantity)? {
                return Err(ServiceError::InsufficientStock {
                    inventory_id: inventory.id,
                    available: from_stock_units(inventory.available()),
                    requested: quantity,
                });
            }

            let unit_cost = self
                .cached_material(txn, &mut materials, allocation.material_id)
                .await?
                .cost_per_unit;

            operations.push(StockOperation::new(inventory.id, quantity));
            pending.push(NewAllocation {
                plan_id: plan.id,
                material_id: allocation.material_id,
                warehouse_id: allocation.warehouse_id,
                inventory_id: inventory.id,
                allocated_quantity: quantity,
                unit_cost,
            });
        }

        let movements = self.stock.reserve_stock(txn, &operations).await?;

        let mut written = Vec::with_capacity(pending.len());
        for allocation in pending {
            written.push(self.repos.allocations.insert(txn, allocation).await?);
        }

        let mut estimated = Decimal::ZERO;
        for requirement in &requirements {
            let material = self
                .cached_material(txn, &mut materials, requirement.material_id)
                .await?;
            estimated += requirement.required_quantity * material.cost_per_unit;
        }

        let mut active = plan.into_active_model();
        active.plan_status = Set(PlanStatus::Pending);
        active.estimated_cost = Set(Some(round_cost(estimated)));
        let plan = self.repos.plans.update(txn, active).await?;

        let low_stock = if self.low_stock_alerts {
            low_stock_events(&movements, &materials)
        } else {
            Vec::new()
        };

        Ok((
            PlanAggregate {
                plan,
                allocations: written,
            },
            low_stock,
        ))
    }

    async fn start_in(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<PlanAggregate, ServiceError> {
        let plan = self.load_plan(txn, plan_id, true).await?;
        ensure_status(&plan, PlanStatus::Pending, "start")?;

        let allocations = self.repos.allocations.find_by_plan(txn, plan.id).await?;
        let operations: Vec<StockOperation> = allocations
            .iter()
            .map(|a| StockOperation::new(a.inventory_id, a.allocated_quantity))
            .collect();
        self.stock.deduct_stock(txn, &operations).await?;

        let mut active = plan.into_active_model();
        active.plan_status = Set(PlanStatus::Production);
        active.started_at = Set(Some(Utc::now()));
        let plan = self.repos.plans.update(txn, active).await?;

        Ok(PlanAggregate { plan, allocations })
    }

    async fn complete_in(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
        actual_produced_quantity: i32,
    ) -> Result<PlanAggregate, ServiceError> {
        let plan = self.load_plan(txn, plan_id, true).await?;
        ensure_status(&plan, PlanStatus::Production, "complete")?;
        check_produced_quantity(&plan, actual_produced_quantity)?;

        let actual_cost = self.settle(txn, &plan, actual_produced_quantity).await?;

        let mut active = plan.into_active_model();
        active.plan_status = Set(PlanStatus::Completed);
        active.completed_at = Set(Some(Utc::now()));
        active.actual_produced_quantity = Set(Some(actual_produced_quantity));
        active.actual_cost = Set(Some(actual_cost));
        let plan = self.repos.plans.update(txn, active).await?;

        self.aggregate(txn, plan).await
    }

    async fn cancel_in(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
        request: &CancelPlanRequest,
    ) -> Result<PlanAggregate, ServiceError> {
        request.validate()?;
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Cancel reason is required".to_string(),
            ));
        }

        let plan = self.load_plan(txn, plan_id, true).await?;
        if !plan.plan_status.can_transition_to(PlanStatus::Cancelled) {
            warn!(plan_id, status = %plan.plan_status, "Rejected cancel of finished plan");
            return Err(ServiceError::InvalidState(format!(
                "Plan {} is already {} and cannot be cancelled",
                plan.id, plan.plan_status
            )));
        }

        let mut active = plan.clone().into_active_model();
        match plan.plan_status {
            PlanStatus::Draft | PlanStatus::Pending => {
                if request.actual_produced_quantity.unwrap_or(0) != 0 {
                    return Err(ServiceError::InvalidInput(format!(
                        "actual_produced_quantity must not be given when cancelling a {} plan; production has not started",
                        plan.plan_status
                    )));
                }

                let allocations = self.repos.allocations.find_by_plan(txn, plan.id).await?;
                let operations: Vec<StockOperation> = allocations
                    .iter()
                    .map(|a| StockOperation::new(a.inventory_id, a.allocated_quantity))
                    .collect();
                self.stock.release_reservation(txn, &operations).await?;
                for allocation in &allocations {
                    self.repos
                        .allocations
                        .record_usage(txn, allocation.id, Decimal::ZERO, allocation.allocated_quantity)
                        .await?;
                }
            }
            PlanStatus::Production => {
                let produced = request.actual_produced_quantity.ok_or_else(|| {
                    ServiceError::InvalidInput(
                        "actual_produced_quantity is required when cancelling a plan in production"
                            .to_string(),
                    )
                })?;
                check_produced_quantity(&plan, produced)?;

                let actual_cost = self.settle(txn, &plan, produced).await?;
                active.actual_produced_quantity = Set(Some(produced));
                active.actual_cost = Set(Some(actual_cost));
            }
            PlanStatus::Completed | PlanStatus::Cancelled => {
                return Err(ServiceError::InternalError(format!(
                    "Plan {} reached an unexpected cancel branch",
                    plan.id
                )));
            }
        }

        active.plan_status = Set(PlanStatus::Cancelled);
        active.cancelled_at = Set(Some(Utc::now()));
        active.cancel_reason = Set(Some(reason.to_string()));
        let plan = self.repos.plans.update(txn, active).await?;

        self.aggregate(txn, plan).await
    }

    /// Records used/returned amounts for every allocation and puts the
    /// returned portions back on hand. Returns the actual cost.
    async fn settle(
        &self,
        txn: &DatabaseTransaction,
        plan: &production_plan::Model,
        actual_produced_quantity: i32,
    ) -> Result<Decimal, ServiceError> {
        let ratio = ratio(actual_produced_quantity, plan.input_quantity).ok_or_else(|| {
            ServiceError::InvalidInput(format!("Plan {} has an input quantity of zero", plan.id))
        })?;

        let allocations = self.repos.allocations.find_by_plan(txn, plan.id).await?;
        let (usages, actual_cost) = calculate_material_usage(&allocations, ratio);

        let returns: Vec<StockOperation> = usages
            .iter()
            .filter(|u| u.returned_quantity > Decimal::ZERO)
            .map(|u| StockOperation::new(u.inventory_id, u.returned_quantity))
            .collect();
        self.stock.return_stock(txn, &returns).await?;

        for usage in &usages {
            self.repos
                .allocations
                .record_usage(txn, usage.allocation_id, usage.used_quantity, usage.returned_quantity)
                .await?;
        }

        Ok(actual_cost)
    }

    async fn load_plan(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
        lock: bool,
    ) -> Result<production_plan::Model, ServiceError> {
        let plan = if lock {
            self.repos.plans.find_for_update(txn, plan_id).await?
        } else {
            self.repos.plans.find_by_id(txn, plan_id).await?
        };
        plan.ok_or_else(|| ServiceError::not_found("Production plan", plan_id))
    }

    async fn aggregate(
        &self,
        txn: &DatabaseTransaction,
        plan: production_plan::Model,
    ) -> Result<PlanAggregate, ServiceError> {
        let allocations = self.repos.allocations.find_by_plan(txn, plan.id).await?;
        Ok(PlanAggregate { plan, allocations })
    }

    async fn material(
        &self,
        txn: &DatabaseTransaction,
        material_id: i32,
    ) -> Result<material::Model, ServiceError> {
        self.repos
            .catalog
            .get_material(txn, material_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Material", material_id))
    }

    async fn cached_material<'a>(
        &self,
        txn: &DatabaseTransaction,
        cache: &'a mut HashMap<i32, material::Model>,
        material_id: i32,
    ) -> Result<&'a material::Model, ServiceError> {
        if !cache.contains_key(&material_id) {
            let material = self.material(txn, material_id).await?;
            cache.insert(material_id, material);
        }
        cache
            .get(&material_id)
            .ok_or_else(|| ServiceError::not_found("Material", material_id))
    }
}

fn ensure_status(
    plan: &production_plan::Model,
    expected: PlanStatus,
    transition: &str,
) -> Result<(), ServiceError> {
    if plan.plan_status == expected {
        return Ok(());
    }
    warn!(
        plan_id = plan.id,
        status = %plan.plan_status,
        transition,
        "Rejected plan transition"
    );
    Err(ServiceError::InvalidState(format!(
        "Cannot {} plan {}: status is {}, expected {}",
        transition, plan.id, plan.plan_status, expected
    )))
}

fn check_produced_quantity(
    plan: &production_plan::Model,
    actual_produced_quantity: i32,
) -> Result<(), ServiceError> {
    if actual_produced_quantity < 0 {
        return Err(ServiceError::InvalidInput(format!(
            "actual_produced_quantity must not be negative, got {}",
            actual_produced_quantity
        )));
    }
    if actual_produced_quantity > plan.input_quantity {
        return Err(ServiceError::InvalidInput(format!(
            "actual_produced_quantity ({}) cannot exceed input_quantity ({})",
            actual_produced_quantity, plan.input_quantity
        )));
    }
    Ok(())
}

/// Every allocated material must belong to the BOM, and the allocations of
/// each BOM material must add up to at least its required quantity.
pub fn validate_allocations(
    requirements: &[MaterialRequirement],
    allocations: &[AllocationInput],
) -> Result<(), ServiceError> {
    let mut totals: BTreeMap<i32, Decimal> = BTreeMap::new();
    for allocation in allocations {
        if !requirements
            .iter()
            .any(|r| r.material_id == allocation.material_id)
        {
            return Err(ServiceError::InvalidInput(format!(
                "Material {} is not part of the product's BOM",
                allocation.material_id
            )));
        }
        *totals.entry(allocation.material_id).or_default() += round_quantity(allocation.quantity);
    }

    for requirement in requirements {
        let allocated = totals
            .get(&requirement.material_id)
            .copied()
            .unwrap_or_default();
        if allocated < requirement.required_quantity {
            return Err(ServiceError::AllocationInsufficient {
                material_id: requirement.material_id,
                required: requirement.required_quantity,
                allocated,
            });
        }
    }
    Ok(())
}

fn low_stock_events(
    movements: &[StockMovement],
    materials: &HashMap<i32, material::Model>,
) -> Vec<PlanEvent> {
    // Keep only the final levels of each row.
    let mut latest: BTreeMap<i32, &StockMovement> = BTreeMap::new();
    for movement in movements {
        latest.insert(movement.inventory_id, movement);
    }

    latest
        .into_values()
        .filter_map(|movement| {
            let material = materials.get(&movement.material_id)?;
            let available = movement.after.available();
            (from_stock_units(available) <= material.min_stock).then(|| {
                PlanEvent::LowStockDetected {
                    inventory_id: movement.inventory_id,
                    material_id: movement.material_id,
                    warehouse_id: movement.warehouse_id,
                    available,
                    min_stock: material.min_stock,
                }
            })
        })
        .collect()
}

fn transition_outcome<T>(
    transition: &'static str,
    outcome: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    outcome.map_err(|err| {
        counter!(
            "production_plans.transition_failed",
            1,
            "transition" => transition,
            "code" => err.error_code()
        );
        warn!(transition, code = err.error_code(), error = %err, "Plan transition failed");
        err
    })
}
