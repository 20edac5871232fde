//! Point/yen conversion. Pure arithmetic, no side effects.
//!
//! Yen amounts are integers (JPY has no minor unit); rates are decimals.
//! Conversions round with ceiling so the platform never under-charges, fees
//! round with floor so the cast is never over-charged.

use bigdecimal::{BigDecimal, ToPrimitive};
use bigdecimal::rounding::RoundingMode;

/// Division guard. Rates at or below zero are floored here.
fn rate_floor() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(10_000)
}

fn to_i64(value: BigDecimal) -> i64 {
    // Scale-0 values from realistic balances always fit; saturate rather
    // than wrap if someone feeds in nonsense.
    value.to_i64().unwrap_or(i64::MAX)
}

pub fn points_to_yen(points: i64, rate: &BigDecimal) -> i64 {
    let product = BigDecimal::from(points) * rate;
    to_i64(product.with_scale_round(0, RoundingMode::Ceiling))
}

pub fn yen_to_points(yen: i64, rate: &BigDecimal) -> i64 {
    let floor = rate_floor();
    let rate = if rate <= &BigDecimal::from(0) { &floor } else { rate };
    let quotient = BigDecimal::from(yen) / rate;
    to_i64(quotient.with_scale_round(0, RoundingMode::Ceiling))
}

/// Consumption tax applies on the automatic-payment path only; the payout
/// path uses the fee model instead.
pub fn apply_consumption_tax(yen: i64, tax_rate: &BigDecimal) -> i64 {
    let taxed = BigDecimal::from(yen) * tax_rate;
    to_i64(taxed.with_scale_round(0, RoundingMode::Ceiling))
}

/// Gateway-imposed minimum chargeable amount.
pub fn clamp_min_charge(yen: i64, min_yen: i64) -> i64 {
    yen.max(min_yen)
}

pub fn fee_amount(gross_yen: i64, fee_rate: &BigDecimal) -> i64 {
    let fee = BigDecimal::from(gross_yen) * fee_rate;
    to_i64(fee.with_scale_round(0, RoundingMode::Floor))
}
