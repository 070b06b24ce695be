//! Money calculation utilities using rust_decimal for precision
//!
//! Prices and totals are stored and serialized as `f64`, but every
//! arithmetic step goes through `Decimal` and rounds to 2 decimal places,
//! so accumulated line subtotals never drift the way raw float addition
//! does.

use rust_decimal::prelude::*;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed price per catalog item (€1,000,000)
pub const MAX_PRICE: f64 = 1_000_000.0;

/// Maximum allowed quantity per order line
pub const MAX_QUANTITY: i64 = 9999;

/// Convert a stored f64 amount into a rounded Decimal
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp(DECIMAL_PLACES)
}

/// Convert a Decimal back to its f64 storage form
pub fn to_f64(value: Decimal) -> f64 {
    value.round_dp(DECIMAL_PLACES).to_f64().unwrap_or(0.0)
}

/// Line subtotal: frozen unit price × quantity
pub fn line_subtotal(price_unit: f64, quantity: i64) -> Decimal {
    (to_decimal(price_unit) * Decimal::from(quantity)).round_dp(DECIMAL_PLACES)
}

/// Order total: sum of line subtotals
pub fn order_total(subtotals: impl Iterator<Item = f64>) -> Decimal {
    subtotals
        .map(to_decimal)
        .sum::<Decimal>()
        .round_dp(DECIMAL_PLACES)
}
