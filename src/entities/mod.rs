//! Persistent entities for the production planning domain.

pub mod bom_line;
pub mod material;
pub mod material_inventory;
pub mod plan_material_allocation;
pub mod product;
pub mod production_plan;
pub mod warehouse;

pub use production_plan::{PlanPriority, PlanStatus};
