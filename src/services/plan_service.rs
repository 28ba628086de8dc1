use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    common::round_quantity,
    db,
    entities::{production_plan, PlanPriority, PlanStatus},
    errors::ServiceError,
    repositories::Repositories,
    services::{
        bom_calculator::{BomCalculator, MaterialRequirement},
        plan_workflow::PlanAggregate,
    },
};

/// Input for creating a production plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewPlan {
    #[validate(length(max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub product_id: i32,
    #[validate(range(min = 1, message = "input_quantity must be at least 1"))]
    pub input_quantity: i32,
    pub priority: Option<PlanPriority>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialAvailability {
    #[serde(flatten)]
    pub requirement: MaterialRequirement,
    pub material_name: String,
    /// Unreserved stock summed over every warehouse
    pub available_quantity: Decimal,
    pub is_sufficient: bool,
    pub shortage_quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialRequirementReport {
    pub plan_id: i32,
    pub product_id: i32,
    pub input_quantity: i32,
    pub materials: Vec<MaterialAvailability>,
    pub all_materials_sufficient: bool,
    pub insufficient_count: usize,
}

/// Plan creation, lookup, soft deletion and stock sufficiency checks.
#[derive(Clone)]
pub struct PlanService {
    db: Arc<DatabaseConnection>,
    repos: Repositories,
    calculator: BomCalculator,
}

impl PlanService {
    pub fn new(db: Arc<DatabaseConnection>, repos: Repositories) -> Self {
        let calculator = BomCalculator::new(repos.catalog.clone());
        Self {
            db,
            repos,
            calculator,
        }
    }

    /// Creates a DRAFT plan for a product that has an active BOM.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn create_plan(&self, input: NewPlan) -> Result<production_plan::Model, ServiceError> {
        input.validate()?;
        if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
            if end < start {
                return Err(ServiceError::InvalidInput(format!(
                    "end_date {} is before start_date {}",
                    end, start
                )));
            }
        }

        let txn = db::begin(&self.db).await?;
        let result = self.create_in(&txn, input).await;
        let plan = db::finish(txn, "create_plan", result).await?;

        info!(plan_id = plan.id, product_id = plan.product_id, "Production plan created");
        Ok(plan)
    }

    #[instrument(skip(self))]
    pub async fn get_plan(&self, plan_id: i32) -> Result<production_plan::Model, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.find_plan(&txn, plan_id).await;
        db::finish(txn, "get_plan", result).await
    }

    #[instrument(skip(self))]
    pub async fn get_plan_with_allocations(
        &self,
        plan_id: i32,
    ) -> Result<PlanAggregate, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result: Result<PlanAggregate, ServiceError> = async {
            let plan = self.find_plan(&txn, plan_id).await?;
            let allocations = self.repos.allocations.find_by_plan(&txn, plan.id).await?;
            Ok(PlanAggregate { plan, allocations })
        }
        .await;
        db::finish(txn, "get_plan_with_allocations", result).await
    }

    /// Soft-deletes a plan regardless of its status.
    #[instrument(skip(self))]
    pub async fn delete_plan(&self, plan_id: i32) -> Result<(), ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result: Result<(), ServiceError> = async {
            if self.repos.plans.soft_delete(&txn, plan_id).await? {
                Ok(())
            } else {
                Err(ServiceError::not_found("Production plan", plan_id))
            }
        }
        .await;
        db::finish(txn, "delete_plan", result).await?;

        info!(plan_id, "Production plan deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restore_plan(&self, plan_id: i32) -> Result<production_plan::Model, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result: Result<production_plan::Model, ServiceError> = async {
            self.repos
                .plans
                .restore(&txn, plan_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Deleted production plan {} not found", plan_id))
                })
        }
        .await;
        let plan = db::finish(txn, "restore_plan", result).await?;

        info!(plan_id, "Production plan restored");
        Ok(plan)
    }

    /// Compares each BOM requirement of a plan with the unreserved stock of
    /// that material across all warehouses.
    #[instrument(skip(self))]
    pub async fn material_requirements(
        &self,
        plan_id: i32,
    ) -> Result<MaterialRequirementReport, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.requirements_in(&txn, plan_id).await;
        db::finish(txn, "material_requirements", result).await
    }

    async fn create_in(
        &self,
        txn: &DatabaseTransaction,
        input: NewPlan,
    ) -> Result<production_plan::Model, ServiceError> {
        let product = self
            .repos
            .catalog
            .get_product(txn, input.product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", input.product_id))?;
        if !product.is_active {
            return Err(ServiceError::InvalidInput(format!(
                "Product {} is inactive",
                product.id
            )));
        }

        let lines = self.repos.catalog.get_bom_lines(txn, product.id).await?;
        if lines.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "Product {} has no active BOM",
                product.id
            )));
        }

        let plan = production_plan::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            product_id: Set(product.id),
            input_quantity: Set(input.input_quantity),
            plan_status: Set(PlanStatus::Draft),
            priority: Set(input.priority.unwrap_or_default()),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            estimated_cost: Set(None),
            actual_produced_quantity: Set(None),
            actual_cost: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            cancelled_at: Set(None),
            cancel_reason: Set(None),
            updated_at: Set(None),
            deleted_at: Set(None),
            ..Default::default()
        };
        self.repos.plans.insert(txn, plan).await
    }

    async fn requirements_in(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<MaterialRequirementReport, ServiceError> {
        let plan = self.find_plan(txn, plan_id).await?;
        let requirements = self
            .calculator
            .calculate(txn, plan.product_id, plan.input_quantity)
            .await?;

        let mut materials = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let material = self
                .repos
                .catalog
                .get_material(txn, requirement.material_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Material", requirement.material_id))?;

            let available: i64 = self
                .repos
                .inventory
                .list_available_by_material(txn, requirement.material_id)
                .await?
                .iter()
                .map(|(inventory, _)| inventory.available())
                .sum();
            let available = Decimal::from(available);

            let is_sufficient = available >= requirement.required_quantity;
            let shortage =
                round_quantity((requirement.required_quantity - available).max(Decimal::ZERO));

            materials.push(MaterialAvailability {
                requirement,
                material_name: material.name,
                available_quantity: available,
                is_sufficient,
                shortage_quantity: shortage,
            });
        }

        let insufficient_count = materials.iter().filter(|m| !m.is_sufficient).count();
        Ok(MaterialRequirementReport {
            plan_id: plan.id,
            product_id: plan.product_id,
            input_quantity: plan.input_quantity,
            all_materials_sufficient: insufficient_count == 0,
            insufficient_count,
            materials,
        })
    }

    async fn find_plan(
        &self,
        txn: &DatabaseTransaction,
        plan_id: i32,
    ) -> Result<production_plan::Model, ServiceError> {
        self.repos
            .plans
            .find_by_id(txn, plan_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Production plan", plan_id))
    }
}
