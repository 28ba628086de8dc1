//! Numeric helpers shared by the calculator, the reservation service and the
//! plan workflow.

use crate::errors::ServiceError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept for allocation and requirement quantities.
pub const QUANTITY_SCALE: u32 = 3;

/// Decimal places kept for costs.
pub const COST_SCALE: u32 = 2;

/// Rounds half away from zero to `scale` places.
pub fn round_to(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_quantity(value: Decimal) -> Decimal {
    round_to(value, QUANTITY_SCALE)
}

pub fn round_cost(value: Decimal) -> Decimal {
    round_to(value, COST_SCALE)
}

/// Rounds to the integer storage precision of inventory rows.
pub fn to_stock_units(value: Decimal) -> Result<i64, ServiceError> {
    round_to(value, 0).to_i64().ok_or_else(|| {
        ServiceError::InternalError(format!("stock quantity {} is out of range", value))
    })
}

pub fn from_stock_units(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Ratio of two integers as a decimal. `None` when `denominator` is zero.
pub fn ratio(numerator: i32, denominator: i32) -> Option<Decimal> {
    if denominator == 0 {
        return None;
    }
    let num = Decimal::from_i32(numerator)?;
    let den = Decimal::from_i32(denominator)?;
    num.checked_div(den)
}
