// Production planning
pub mod bom_calculator;
pub mod plan_service;
pub mod plan_workflow;
pub mod stock_reservation;

pub use bom_calculator::{BomCalculator, MaterialRequirement};
pub use plan_service::{MaterialRequirementReport, NewPlan, PlanService};
pub use plan_workflow::{AllocationInput, CancelPlanRequest, PlanAggregate, PlanWorkflowService};
pub use stock_reservation::{StockOperation, StockReservationService};
