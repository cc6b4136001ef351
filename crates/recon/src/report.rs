use std::collections::BTreeMap;

use crate::config::ToleranceConfig;
use crate::model::{
    CheckField, CrossValidationFinding, FieldFailures, IdentityCheck, OverallStatus,
    ReconciliationCheck, ReconciliationReport, ReportSummary, Severity,
};

/// Pass rate below which the report recommends a calculation review.
pub const LOW_PASS_RATE: f64 = 95.0;

/// Aggregate checks and findings for one batch. Pure: no side effects.
pub fn build_report(
    checks: &[ReconciliationCheck],
    findings: &[CrossValidationFinding],
    identity: &[IdentityCheck],
    tolerance: &ToleranceConfig,
) -> ReconciliationReport {
    let mut passed = 0;
    let mut failed = 0;
    let mut indeterminate = 0;
    let mut failures_by_field: BTreeMap<CheckField, FieldFailures> = BTreeMap::new();

    for c in checks {
        match c.within_tolerance {
            Some(true) => passed += 1,
            None => indeterminate += 1,
            Some(false) => {
                failed += 1;
                let entry = failures_by_field.entry(c.field).or_insert_with(|| FieldFailures {
                    immaterial: 0,
                    checks: Vec::new(),
                });
                if c.relative_variance.is_some_and(|rel| rel <= tolerance.percentage_tolerance) {
                    entry.immaterial += 1;
                }
                entry.checks.push(c.clone());
            }
        }
    }

    let total = checks.len();
    let pass_rate = if total > 0 {
        passed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    let mut validation_summary: BTreeMap<Severity, usize> = BTreeMap::new();
    for f in findings {
        *validation_summary.entry(f.severity).or_insert(0) += 1;
    }
    let errors = validation_summary.get(&Severity::Error).copied().unwrap_or(0);
    let warnings = validation_summary.get(&Severity::Warning).copied().unwrap_or(0);

    let overall_status = if failed == 0 && errors == 0 {
        OverallStatus::Pass
    } else {
        OverallStatus::Fail
    };

    ReconciliationReport {
        summary: ReportSummary {
            total_checks: total,
            passed_checks: passed,
            failed_checks: failed,
            indeterminate_checks: indeterminate,
            pass_rate_percentage: round2(pass_rate),
        },
        failures_by_field,
        validation_summary,
        identity_breaks: identity.iter().filter(|i| !i.passed).count(),
        overall_status,
        recommendations: recommendations(pass_rate, failed, errors, warnings),
    }
}

/// Textual guidance, most severe first. `pass_rate` is the unrounded percentage.
pub fn recommendations(pass_rate: f64, failed: usize, errors: usize, warnings: usize) -> Vec<String> {
    let mut out = Vec::new();

    if pass_rate < LOW_PASS_RATE {
        out.push("Low pass rate detected. Review calculation logic and data quality.".to_string());
    }
    if failed > 0 {
        out.push(format!(
            "{failed} checks failed. Investigate tolerance thresholds and data accuracy."
        ));
    }
    if errors > 0 {
        out.push("Critical validation errors detected. Manual review required.".to_string());
    }
    if warnings > 0 {
        out.push("Data quality warnings detected. Consider additional validation rules.".to_string());
    }
    if out.is_empty() {
        out.push("All checks passed. Data quality is acceptable.".to_string());
    }

    out
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FindingDetails, ValidationType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn check(field: CheckField, within: Option<bool>) -> ReconciliationCheck {
        ReconciliationCheck {
            account_id: "A".into(),
            as_of_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            field,
            calculated_value: Some(Decimal::ONE),
            reference_value: Some(Decimal::ONE),
            variance: Some(Decimal::ZERO),
            relative_variance: Some(Decimal::ZERO),
            threshold: dec!(0.01),
            within_tolerance: within,
            notes: None,
        }
    }

    fn finding(severity: Severity) -> CrossValidationFinding {
        CrossValidationFinding {
            validation_type: ValidationType::PortfolioDateConsistency,
            scope: "P1".into(),
            issue: "x".into(),
            details: FindingDetails::DateConsistency {
                unique_dates: 2,
                total_accounts: 2,
            },
            severity,
        }
    }

    fn nine_checks_two_failed() -> Vec<ReconciliationCheck> {
        let mut checks = Vec::new();
        for _ in 0..3 {
            checks.push(check(CheckField::MarketValue, Some(true)));
            checks.push(check(CheckField::NetFlow, Some(true)));
        }
        checks.push(check(CheckField::Return, Some(true)));
        let mut big_miss = check(CheckField::Return, Some(false));
        big_miss.relative_variance = Some(dec!(0.5));
        checks.push(big_miss);
        checks.push(check(CheckField::MarketValue, Some(false)));
        checks
    }

    #[test]
    fn two_failures_fail_the_batch() {
        let report = build_report(&nine_checks_two_failed(), &[], &[], &ToleranceConfig::default());
        assert_eq!(report.summary.total_checks, 9);
        assert_eq!(report.summary.passed_checks, 7);
        assert_eq!(report.summary.failed_checks, 2);
        assert_eq!(report.summary.pass_rate_percentage, 77.78);
        assert_eq!(report.overall_status, OverallStatus::Fail);
        assert!(report.recommendations.iter().any(|r| r.contains("2 checks failed")));
        assert!(report.recommendations.iter().any(|r| r.starts_with("Low pass rate")));
    }

    #[test]
    fn failures_grouped_by_field() {
        let report = build_report(&nine_checks_two_failed(), &[], &[], &ToleranceConfig::default());
        assert_eq!(report.failures_by_field.len(), 2);
        let ret = &report.failures_by_field[&CheckField::Return];
        assert_eq!(ret.checks.len(), 1);
        assert_eq!(ret.immaterial, 0);
        let mv = &report.failures_by_field[&CheckField::MarketValue];
        assert_eq!(mv.immaterial, 1);
        assert!(!report.failures_by_field.contains_key(&CheckField::NetFlow));
    }

    #[test]
    fn indeterminate_is_neither_pass_nor_fail() {
        let checks = vec![
            check(CheckField::MarketValue, Some(true)),
            check(CheckField::Return, None),
        ];
        let report = build_report(&checks, &[], &[], &ToleranceConfig::default());
        assert_eq!(report.summary.passed_checks, 1);
        assert_eq!(report.summary.failed_checks, 0);
        assert_eq!(report.summary.indeterminate_checks, 1);
        assert_eq!(report.summary.pass_rate_percentage, 50.0);
        assert_eq!(report.overall_status, OverallStatus::Pass);
        assert!(report.failures_by_field.is_empty());
    }

    #[test]
    fn clean_batch_passes() {
        let checks = vec![check(CheckField::MarketValue, Some(true)); 20];
        let report = build_report(&checks, &[], &[], &ToleranceConfig::default());
        assert_eq!(report.summary.pass_rate_percentage, 100.0);
        assert_eq!(report.overall_status, OverallStatus::Pass);
        assert_eq!(report.recommendations, vec!["All checks passed. Data quality is acceptable."]);
    }

    #[test]
    fn warnings_alone_do_not_fail() {
        let checks = vec![check(CheckField::MarketValue, Some(true)); 4];
        let report = build_report(&checks, &[finding(Severity::Warning)], &[], &ToleranceConfig::default());
        assert_eq!(report.overall_status, OverallStatus::Pass);
        assert_eq!(report.validation_summary[&Severity::Warning], 1);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].starts_with("Data quality warnings"));
    }

    #[test]
    fn error_finding_fails_even_with_all_checks_passing() {
        let checks = vec![check(CheckField::MarketValue, Some(true)); 4];
        let report = build_report(&checks, &[finding(Severity::Error)], &[], &ToleranceConfig::default());
        assert_eq!(report.overall_status, OverallStatus::Fail);
        assert!(report.recommendations.iter().any(|r| r.starts_with("Critical validation errors")));
    }

    #[test]
    fn low_pass_rate_decided_before_rounding() {
        // 1899 of 1999 is 94.9975%, shown as 95.00 but still below the cut.
        let mut checks = vec![check(CheckField::MarketValue, Some(true)); 1899];
        checks.extend(vec![check(CheckField::Return, Some(false)); 100]);
        let report = build_report(&checks, &[], &[], &ToleranceConfig::default());
        assert_eq!(report.summary.pass_rate_percentage, 95.0);
        assert_eq!(
            report.recommendations[0],
            "Low pass rate detected. Review calculation logic and data quality."
        );
        assert_eq!(
            report.recommendations[1],
            "100 checks failed. Investigate tolerance thresholds and data accuracy."
        );
    }

    #[test]
    fn exactly_ninety_five_percent_is_not_low() {
        let mut checks = vec![check(CheckField::MarketValue, Some(true)); 19];
        checks.push(check(CheckField::Return, Some(false)));
        let report = build_report(&checks, &[], &[], &ToleranceConfig::default());
        assert_eq!(report.summary.pass_rate_percentage, 95.0);
        assert!(!report.recommendations.iter().any(|r| r.starts_with("Low pass rate")));
    }

    #[test]
    fn empty_batch_has_zero_pass_rate() {
        let report = build_report(&[], &[], &[], &ToleranceConfig::default());
        assert_eq!(report.summary.total_checks, 0);
        assert_eq!(report.summary.pass_rate_percentage, 0.0);
        assert_eq!(report.overall_status, OverallStatus::Pass);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].starts_with("Low pass rate"));
    }

    #[test]
    fn identity_breaks_counted() {
        let ok = IdentityCheck {
            account_id: "A".into(),
            as_of_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            expected_ending_market_value: dec!(10),
            reported_ending_market_value: dec!(10),
            variance: Decimal::ZERO,
            threshold: dec!(0.01),
            passed: true,
        };
        let broken = IdentityCheck {
            reported_ending_market_value: dec!(12),
            variance: dec!(2),
            passed: false,
            ..ok.clone()
        };
        let report = build_report(&[], &[], &[ok, broken], &ToleranceConfig::default());
        assert_eq!(report.identity_breaks, 1);
    }
}
