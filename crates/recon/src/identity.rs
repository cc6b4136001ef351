//! Market-value roll-forward:
//! `ending ≈ beginning + net_flow + income + appreciation - fees + other_adjustments`.

use rust_decimal::Decimal;

use crate::config::ToleranceConfig;
use crate::metrics::net_flow;
use crate::model::{CanonicalRecord, EnrichedRecord, IdentityCheck};
use crate::tolerance::within;

/// Ending value implied by the period's components. Nulls read as zero.
pub fn expected_ending_market_value(record: &CanonicalRecord) -> Decimal {
    record.beginning_market_value
        + net_flow(record)
        + record.income.unwrap_or_default()
        + record.appreciation.unwrap_or_default()
        - record.fees.unwrap_or_default()
        + record.other_adjustments.unwrap_or_default()
}

pub fn check_identity(record: &CanonicalRecord, tolerance: &ToleranceConfig) -> IdentityCheck {
    let expected = expected_ending_market_value(record);
    let variance = (record.ending_market_value - expected).abs();

    IdentityCheck {
        account_id: record.account_id.clone(),
        as_of_date: record.as_of_date,
        expected_ending_market_value: expected,
        reported_ending_market_value: record.ending_market_value,
        variance,
        threshold: tolerance.market_value_tolerance,
        passed: within(variance, tolerance.market_value_tolerance),
    }
}

pub fn check_all(records: &[EnrichedRecord], tolerance: &ToleranceConfig) -> Vec<IdentityCheck> {
    records.iter().map(|r| check_identity(&r.record, tolerance)).collect()
}
