use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, DatabaseTransaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::{
    common::{from_stock_units, to_stock_units},
    db,
    errors::ServiceError,
    repositories::InventoryRepository,
};

/// One quantity change against one inventory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation {
    pub inventory_id: i32,
    pub quantity: Decimal,
}

impl StockOperation {
    pub fn new(inventory_id: i32, quantity: Decimal) -> Self {
        Self {
            inventory_id,
            quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOperationKind {
    Reserve,
    Deduct,
    Return,
    Release,
}

impl StockOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOperationKind::Reserve => "reserve",
            StockOperationKind::Deduct => "deduct",
            StockOperationKind::Return => "return",
            StockOperationKind::Release => "release",
        }
    }
}

impl fmt::Display for StockOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-hand and reserved quantities of an inventory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub quantity: i64,
    pub reserved_quantity: i64,
}

impl StockLevels {
    pub fn new(quantity: i64, reserved_quantity: i64) -> Self {
        Self {
            quantity,
            reserved_quantity,
        }
    }

    pub fn available(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    /// Applies one operation and returns the new levels.
    ///
    /// `amount` is converted to whole stock units once, before any
    /// arithmetic, so a reserve followed by a release (or a deduct followed
    /// by a return) of the same amount restores the levels exactly.
    /// Reserved stock never drops below zero.
    pub fn apply(
        self,
        kind: StockOperationKind,
        inventory_id: i32,
        amount: Decimal,
    ) -> Result<StockLevels, ServiceError> {
        if amount < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(format!(
                "Stock operation quantity must not be negative, got {} for inventory {}",
                amount, inventory_id
            )));
        }
        let units = to_stock_units(amount)?;

        let next = match kind {
            StockOperationKind::Reserve => {
                if self.available() < units {
                    return Err(ServiceError::InsufficientStock {
                        inventory_id,
                        available: from_stock_units(self.available()),
                        requested: amount,
                    });
                }
                StockLevels::new(self.quantity, self.reserved_quantity + units)
            }
            StockOperationKind::Deduct => {
                if self.quantity < units {
                    return Err(ServiceError::InsufficientStock {
                        inventory_id,
                        available: from_stock_units(self.quantity),
                        requested: amount,
                    });
                }
                StockLevels::new(
                    self.quantity - units,
                    (self.reserved_quantity - units).max(0),
                )
            }
            StockOperationKind::Return => {
                let quantity = self.quantity.checked_add(units).ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "Returning {} to inventory {} overflows on-hand stock",
                        amount, inventory_id
                    ))
                })?;
                StockLevels::new(quantity, self.reserved_quantity)
            }
            StockOperationKind::Release => {
                StockLevels::new(self.quantity, (self.reserved_quantity - units).max(0))
            }
        };

        Ok(next)
    }
}

/// Result of applying one operation to a locked inventory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    pub inventory_id: i32,
    pub material_id: i32,
    pub warehouse_id: i32,
    pub kind: StockOperationKind,
    pub quantity: Decimal,
    pub before: StockLevels,
    pub after: StockLevels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAvailability {
    /// Whether the row can cover the requested quantity
    pub available: bool,
    pub current_quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
}

/// Row-locked stock primitives over `material_inventory`.
///
/// The plain variants run inside the caller's transaction and never commit.
/// The `_standalone` variants open and finish a transaction of their own.
#[derive(Clone)]
pub struct StockReservationService {
    db: Arc<DatabaseConnection>,
    inventory: Arc<dyn InventoryRepository>,
}

impl StockReservationService {
    pub fn new(db: Arc<DatabaseConnection>, inventory: Arc<dyn InventoryRepository>) -> Self {
        Self { db, inventory }
    }

    /// Reserves stock. Fails when `quantity - reserved_quantity` cannot cover
    /// an operation.
    #[instrument(skip(self, txn, ops), fields(ops = ops.len()))]
    pub async fn reserve_stock(
        &self,
        txn: &DatabaseTransaction,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.apply_all(txn, StockOperationKind::Reserve, ops).await
    }

    /// Removes on-hand stock and consumes the matching reservation.
    #[instrument(skip(self, txn, ops), fields(ops = ops.len()))]
    pub async fn deduct_stock(
        &self,
        txn: &DatabaseTransaction,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.apply_all(txn, StockOperationKind::Deduct, ops).await
    }

    /// Puts stock back on hand.
    #[instrument(skip(self, txn, ops), fields(ops = ops.len()))]
    pub async fn return_stock(
        &self,
        txn: &DatabaseTransaction,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.apply_all(txn, StockOperationKind::Return, ops).await
    }

    /// Cancels reservations without touching on-hand stock.
    #[instrument(skip(self, txn, ops), fields(ops = ops.len()))]
    pub async fn release_reservation(
        &self,
        txn: &DatabaseTransaction,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.apply_all(txn, StockOperationKind::Release, ops).await
    }

    pub async fn reserve_stock_standalone(
        &self,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.standalone(StockOperationKind::Reserve, ops).await
    }

    pub async fn deduct_stock_standalone(
        &self,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.standalone(StockOperationKind::Deduct, ops).await
    }

    pub async fn return_stock_standalone(
        &self,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.standalone(StockOperationKind::Return, ops).await
    }

    pub async fn release_reservation_standalone(
        &self,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        self.standalone(StockOperationKind::Release, ops).await
    }

    /// Reports whether an inventory row can cover `required` units. No lock
    /// is taken.
    #[instrument(skip(self, txn))]
    pub async fn check_available_stock(
        &self,
        txn: &DatabaseTransaction,
        inventory_id: i32,
        required: Decimal,
    ) -> Result<StockAvailability, ServiceError> {
        let row = self
            .inventory
            .find_by_id(txn, inventory_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory", inventory_id))?;

        let available_quantity = row.available();
        Ok(StockAvailability {
            available: available_quantity >= to_stock_units(required)?,
            current_quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            available_quantity,
        })
    }

    async fn standalone(
        &self,
        kind: StockOperationKind,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        let txn = db::begin(&self.db).await?;
        let result = self.apply_all(&txn, kind, ops).await;
        db::finish(txn, kind.as_str(), result).await
    }

    /// Locks rows in ascending inventory id order so that concurrent
    /// transitions over overlapping rows cannot deadlock. Ties keep the
    /// caller's order.
    async fn apply_all(
        &self,
        txn: &DatabaseTransaction,
        kind: StockOperationKind,
        ops: &[StockOperation],
    ) -> Result<Vec<StockMovement>, ServiceError> {
        let mut ordered = ops.to_vec();
        ordered.sort_by_key(|op| op.inventory_id);

        if let Some(op) = ordered.iter().find(|op| op.quantity < Decimal::ZERO) {
            return Err(ServiceError::InvalidInput(format!(
                "Stock operation quantity must not be negative, got {} for inventory {}",
                op.quantity, op.inventory_id
            )));
        }

        let mut movements = Vec::with_capacity(ordered.len());
        for op in ordered {
            let row = self
                .inventory
                .find_for_update(txn, op.inventory_id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Inventory", op.inventory_id))?;

            let before = StockLevels::new(row.quantity, row.reserved_quantity);
            let after = before.apply(kind, op.inventory_id, op.quantity).map_err(|e| {
                warn!(
                    inventory_id = op.inventory_id,
                    kind = kind.as_str(),
                    requested = %op.quantity,
                    error = %e,
                    "Stock operation rejected"
                );
                e
            })?;

            self.inventory
                .save_levels(txn, row.id, after.quantity, after.reserved_quantity)
                .await?;

            debug!(
                inventory_id = row.id,
                kind = kind.as_str(),
                quantity = %op.quantity,
                on_hand = after.quantity,
                reserved = after.reserved_quantity,
                "Applied stock operation"
            );

            movements.push(StockMovement {
                inventory_id: row.id,
                material_id: row.material_id,
                warehouse_id: row.warehouse_id,
                kind,
                quantity: op.quantity,
                before,
                after,
            });
        }

        counter!(
            "inventory.stock_operations",
            movements.len() as u64,
            "kind" => kind.as_str()
        );
        Ok(movements)
    }
}
