//! Decimal quantity helpers.
//!
//! Quantities and costs are exact decimals. Values leaving the conversion
//! engine are rounded to [`QUANTITY_SCALE`] places; lot sums are compared to
//! cached totals within [`SYNC_TOLERANCE`].

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Quantity in an item's unit.
pub type Quantity = Decimal;

/// Decimal places kept on converted quantities.
pub const QUANTITY_SCALE: u32 = 3;

/// Allowed drift between a cached total and the sum of its lots (0.001).
pub const SYNC_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Round to `scale` decimal places, midpoint away from zero.
pub fn round_to(value: Decimal, scale: u32) -> Decimal {
    value
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Round to the default [`QUANTITY_SCALE`].
pub fn round_quantity(value: Decimal) -> Decimal {
    round_to(value, QUANTITY_SCALE)
}

/// `|a - b| <= tolerance`.
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}

/// Require a strictly positive value.
pub fn ensure_positive(value: Decimal, what: &str) -> DomainResult<Decimal> {
    if value > Decimal::ZERO {
        Ok(value)
    } else {
        Err(DomainError::validation(format!(
            "{what} must be positive (got {value})"
        )))
    }
}
