use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    common::round_quantity,
    entities::bom_line,
    errors::ServiceError,
    repositories::CatalogRepository,
};

/// Material needed to produce a given quantity of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: i32,
    pub usage_per_piece: Decimal,
    pub scrap_factor: Decimal,
    pub net_quantity: Decimal,
    pub scrap_quantity: Decimal,
    pub required_quantity: Decimal,
    pub unit_id: Option<i32>,
}

/// Computes the requirement of a single BOM line.
///
/// `net = usage * qty`, `scrap = net * scrap_factor`, and the required
/// quantity is their sum rounded to three places. A missing scrap factor
/// counts as zero.
pub fn requirement_for_line(line: &bom_line::Model, production_quantity: i32) -> MaterialRequirement {
    let quantity = Decimal::from(production_quantity);
    let scrap_factor = line.scrap_factor.unwrap_or(Decimal::ZERO);
    let net_quantity = line.usage_per_piece * quantity;
    let scrap_quantity = net_quantity * scrap_factor;

    MaterialRequirement {
        material_id: line.material_id,
        usage_per_piece: line.usage_per_piece,
        scrap_factor,
        net_quantity: round_quantity(net_quantity),
        scrap_quantity: round_quantity(scrap_quantity),
        required_quantity: round_quantity(net_quantity + scrap_quantity),
        unit_id: line.unit_id,
    }
}

/// Turns a product's bill of materials into per-material requirements.
#[derive(Clone)]
pub struct BomCalculator {
    catalog: Arc<dyn CatalogRepository>,
}

impl BomCalculator {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Requirements for `production_quantity` pieces of `product_id`, in BOM
    /// line order. Reads only.
    #[instrument(skip(self, txn))]
    pub async fn calculate(
        &self,
        txn: &DatabaseTransaction,
        product_id: i32,
        production_quantity: i32,
    ) -> Result<Vec<MaterialRequirement>, ServiceError> {
        if production_quantity < 1 {
            return Err(ServiceError::InvalidInput(format!(
                "Production quantity must be at least 1, got {}",
                production_quantity
            )));
        }

        let lines = self.catalog.get_bom_lines(txn, product_id).await?;
        if lines.is_empty() {
            warn!(product_id, "Product has no active BOM lines");
            return Err(ServiceError::NotFound(format!(
                "No active BOM found for product {}",
                product_id
            )));
        }

        let mut requirements = Vec::with_capacity(lines.len());
        for line in &lines {
            let material = self
                .catalog
                .get_material(txn, line.material_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Material", line.material_id))?;

            if !material.is_active {
                return Err(ServiceError::NotFound(format!(
                    "Material {} referenced by BOM line {} is inactive",
                    material.id, line.id
                )));
            }

            let requirement = requirement_for_line(line, production_quantity);
            debug!(
                material_id = requirement.material_id,
                required = %requirement.required_quantity,
                "Calculated material requirement"
            );
            requirements.push(requirement);
        }

        Ok(requirements)
    }
}
