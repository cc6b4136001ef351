//! Tolerance Checker: one [`ReconciliationCheck`] per record per field.

use rust_decimal::Decimal;

use crate::config::{ReturnBasis, ToleranceConfig};
use crate::identity::expected_ending_market_value;
use crate::model::{CheckField, EnrichedRecord, ReconciliationCheck};

/// Boundary-inclusive threshold test. Exact: both sides are decimals.
pub fn within(variance: Decimal, threshold: Decimal) -> bool {
    variance <= threshold
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub variance: Option<Decimal>,
    pub relative_variance: Option<Decimal>,
    pub within_tolerance: Option<bool>,
}

/// Compare two optional values. Indeterminate (`None`) when either is missing.
/// The relative variance is `None` against a zero reference.
pub fn compare(calculated: Option<Decimal>, reference: Option<Decimal>, threshold: Decimal) -> Comparison {
    match (calculated, reference) {
        (Some(c), Some(r)) => {
            let variance = (c - r).abs();
            let relative_variance = variance.checked_div(r.abs());
            Comparison {
                variance: Some(variance),
                relative_variance,
                within_tolerance: Some(within(variance, threshold)),
            }
        }
        _ => Comparison {
            variance: None,
            relative_variance: None,
            within_tolerance: None,
        },
    }
}

/// The three field checks for one enriched record, in field order.
pub fn check_record(
    enriched: &EnrichedRecord,
    tolerance: &ToleranceConfig,
    basis: ReturnBasis,
) -> [ReconciliationCheck; 3] {
    [
        market_value_check(enriched, tolerance),
        return_check(enriched, tolerance, basis),
        net_flow_check(enriched, tolerance),
    ]
}

pub fn check_all(
    records: &[EnrichedRecord],
    tolerance: &ToleranceConfig,
    basis: ReturnBasis,
) -> Vec<ReconciliationCheck> {
    records
        .iter()
        .flat_map(|r| check_record(r, tolerance, basis))
        .collect()
}

fn market_value_check(enriched: &EnrichedRecord, tolerance: &ToleranceConfig) -> ReconciliationCheck {
    let record = &enriched.record;
    build(
        enriched,
        CheckField::MarketValue,
        Some(expected_ending_market_value(record)),
        Some(record.ending_market_value),
        tolerance.market_value_tolerance,
        tolerance.percentage_tolerance,
        Vec::new(),
    )
}

fn return_check(
    enriched: &EnrichedRecord,
    tolerance: &ToleranceConfig,
    basis: ReturnBasis,
) -> ReconciliationCheck {
    let calculated = match basis {
        ReturnBasis::Period => enriched.metrics.period_return,
        ReturnBasis::Cumulative => enriched.metrics.cumulative_return,
    };
    let reference = enriched.record.reference_return;

    let mut notes = Vec::new();
    match (calculated, reference) {
        (None, None) => notes.push("missing calculated and reference return".to_string()),
        (None, Some(_)) => notes.push("missing calculated return".to_string()),
        (Some(_), None) => notes.push("missing reference return".to_string()),
        (Some(_), Some(_)) => {}
    }

    build(
        enriched,
        CheckField::Return,
        calculated,
        reference,
        tolerance.return_tolerance,
        tolerance.percentage_tolerance,
        notes,
    )
}

fn net_flow_check(enriched: &EnrichedRecord, tolerance: &ToleranceConfig) -> ReconciliationCheck {
    let record = &enriched.record;
    let calculated = record.contributions.unwrap_or_default() - record.distributions.unwrap_or_default();

    let mut notes = Vec::new();
    let reference = match record.reported_net_flow {
        Some(reported) => reported,
        None => {
            notes.push("reference is stored derived net flow".to_string());
            enriched.metrics.net_flow
        }
    };

    build(
        enriched,
        CheckField::NetFlow,
        Some(calculated),
        Some(reference),
        tolerance.net_flow_tolerance,
        tolerance.percentage_tolerance,
        notes,
    )
}

fn build(
    enriched: &EnrichedRecord,
    field: CheckField,
    calculated: Option<Decimal>,
    reference: Option<Decimal>,
    threshold: Decimal,
    percentage_tolerance: Decimal,
    mut notes: Vec<String>,
) -> ReconciliationCheck {
    let cmp = compare(calculated, reference, threshold);

    if cmp.within_tolerance == Some(false) {
        if let Some(rel) = cmp.relative_variance {
            if rel <= percentage_tolerance {
                notes.push("within relative tolerance".to_string());
            }
        }
    }

    ReconciliationCheck {
        account_id: enriched.record.account_id.clone(),
        as_of_date: enriched.record.as_of_date,
        field,
        calculated_value: calculated,
        reference_value: reference,
        variance: cmp.variance,
        relative_variance: cmp.relative_variance,
        threshold,
        within_tolerance: cmp.within_tolerance,
        notes: if notes.is_empty() { None } else { Some(notes.join("; ")) },
    }
}
