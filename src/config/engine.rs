//! Engine tunables. Built once at startup and injected into the services as
//! an immutable value; nothing reads process-wide settings ad hoc.

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::domain::Grade;

/// Per-grade fee rates with a default fallback.
#[derive(Debug, Clone)]
pub struct FeeTable {
    rates: HashMap<Grade, BigDecimal>,
    default_rate: BigDecimal,
}

impl FeeTable {
    pub fn new(default_rate: BigDecimal, rates: HashMap<Grade, BigDecimal>) -> Self {
        Self { rates, default_rate }
    }

    pub fn rate_for(&self, grade: Grade) -> &BigDecimal {
        self.rates.get(&grade).unwrap_or(&self.default_rate)
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Yen per point.
    pub point_rate: BigDecimal,
    /// Multiplier applied to automatic charges (1.1 = 10% consumption tax).
    pub consumption_tax_rate: BigDecimal,
    /// Gateway floor for card charges.
    pub min_charge_yen: i64,
    /// Days between authorization and capture of automatic payments.
    pub capture_delay_days: i64,
    /// Months between a closing period and its scheduled payout.
    pub payout_offset_months: u32,
    pub business_day_adjustment: bool,
    pub instant_min_yen: i64,
    pub instant_min_points: i64,
    /// Cap on the share of the unsettled balance an instant payout may take.
    pub instant_max_ratio: BigDecimal,
    /// Instant requests at or above this amount wait for admin approval.
    pub instant_approval_threshold_yen: i64,
    pub scheduled_fees: FeeTable,
    pub instant_fees: FeeTable,
    pub currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let dec = |s: &str| {
            // constants, always parseable
            BigDecimal::from_str(s).unwrap_or_default()
        };
        let scheduled = FeeTable::new(
            dec("0.10"),
            HashMap::from([
                (Grade::Gold, dec("0.08")),
                (Grade::Platinum, dec("0.07")),
                (Grade::Centurion, dec("0.05")),
            ]),
        );
        let instant = FeeTable::new(
            dec("0.15"),
            HashMap::from([
                (Grade::Gold, dec("0.13")),
                (Grade::Platinum, dec("0.12")),
                (Grade::Centurion, dec("0.10")),
            ]),
        );
        Self {
            point_rate: dec("1.2"),
            consumption_tax_rate: dec("1.1"),
            min_charge_yen: 100,
            capture_delay_days: 2,
            payout_offset_months: 1,
            business_day_adjustment: true,
            instant_min_yen: 5_000,
            instant_min_points: 1_000,
            instant_max_ratio: dec("0.5"),
            instant_approval_threshold_yen: 30_000,
            scheduled_fees: scheduled,
            instant_fees: instant,
            currency: "jpy".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by environment variables where present.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("POINT_RATE_YEN") {
            config.point_rate =
                BigDecimal::from_str(&raw).context("POINT_RATE_YEN is not a decimal")?;
        }
        if let Ok(raw) = env::var("CONSUMPTION_TAX_RATE") {
            config.consumption_tax_rate =
                BigDecimal::from_str(&raw).context("CONSUMPTION_TAX_RATE is not a decimal")?;
        }
        if let Ok(raw) = env::var("MIN_CHARGE_YEN") {
            config.min_charge_yen = raw.parse().context("MIN_CHARGE_YEN is not an integer")?;
        }
        if let Ok(raw) = env::var("CAPTURE_DELAY_DAYS") {
            config.capture_delay_days =
                raw.parse().context("CAPTURE_DELAY_DAYS is not an integer")?;
        }
        if let Ok(raw) = env::var("PAYOUT_OFFSET_MONTHS") {
            config.payout_offset_months =
                raw.parse().context("PAYOUT_OFFSET_MONTHS is not an integer")?;
        }
        if let Ok(raw) = env::var("BUSINESS_DAY_ADJUSTMENT") {
            config.business_day_adjustment = raw == "1" || raw.eq_ignore_ascii_case("true");
        }
        if let Ok(raw) = env::var("INSTANT_MIN_YEN") {
            config.instant_min_yen = raw.parse().context("INSTANT_MIN_YEN is not an integer")?;
        }
        if let Ok(raw) = env::var("INSTANT_MIN_POINTS") {
            config.instant_min_points =
                raw.parse().context("INSTANT_MIN_POINTS is not an integer")?;
        }
        if let Ok(raw) = env::var("INSTANT_MAX_RATIO") {
            config.instant_max_ratio =
                BigDecimal::from_str(&raw).context("INSTANT_MAX_RATIO is not a decimal")?;
        }
        if let Ok(raw) = env::var("INSTANT_APPROVAL_THRESHOLD_YEN") {
            config.instant_approval_threshold_yen = raw
                .parse()
                .context("INSTANT_APPROVAL_THRESHOLD_YEN is not an integer")?;
        }

        Ok(config)
    }
}
