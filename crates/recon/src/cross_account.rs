//! Cross-Account Validator. Runs once per batch, after every account's
//! metrics are complete, over accounts grouped by portfolio.
//!
//! The fixed sigma rule is weak on small groups: with sample standard
//! deviation no point can sit more than `(n - 1) / sqrt(n)` deviations from
//! the mean, so a 3-sigma flag needs at least 11 returns in the group.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::{Decimal, MathematicalOps};
use tracing::debug;

use crate::config::OutlierConfig;
use crate::model::{CrossValidationFinding, EnrichedRecord, FindingDetails, Severity, ValidationType};

/// Sample mean and sample standard deviation (n - 1). `None` below two values.
pub fn mean_and_std_dev(values: &[Decimal]) -> Option<(Decimal, Decimal)> {
    if values.len() < 2 {
        return None;
    }
    let n = Decimal::from(values.len());
    let mean = values.iter().sum::<Decimal>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<Decimal>() / (n - Decimal::ONE);
    Some((mean, variance.sqrt()?))
}

/// Run every portfolio-level check. Records without a portfolio are not grouped.
pub fn validate_portfolios(records: &[EnrichedRecord], config: &OutlierConfig) -> Vec<CrossValidationFinding> {
    let mut groups: BTreeMap<&str, Vec<&EnrichedRecord>> = BTreeMap::new();
    for r in records {
        if let Some(portfolio_id) = r.record.portfolio_id.as_deref() {
            groups.entry(portfolio_id).or_default().push(r);
        }
    }

    let mut findings = Vec::new();
    for (portfolio_id, members) in &groups {
        if let Some(f) = check_date_consistency(portfolio_id, members) {
            findings.push(f);
        }
        if let Some(f) = check_return_outliers(portfolio_id, members, config) {
            findings.push(f);
        }
        if let Some(max_abs_return) = config.max_abs_return {
            if let Some(f) = check_implausible_returns(portfolio_id, members, max_abs_return) {
                findings.push(f);
            }
        }
    }
    findings
}

fn check_date_consistency(portfolio_id: &str, members: &[&EnrichedRecord]) -> Option<CrossValidationFinding> {
    let dates: BTreeSet<_> = members.iter().map(|r| r.record.as_of_date).collect();
    if dates.len() <= 1 {
        return None;
    }
    let accounts: BTreeSet<&str> = members.iter().map(|r| r.record.account_id.as_str()).collect();

    Some(CrossValidationFinding {
        validation_type: ValidationType::PortfolioDateConsistency,
        scope: portfolio_id.to_string(),
        issue: "Inconsistent dates across accounts in portfolio".into(),
        details: FindingDetails::DateConsistency {
            unique_dates: dates.len(),
            total_accounts: accounts.len(),
        },
        severity: Severity::Warning,
    })
}

fn check_return_outliers(
    portfolio_id: &str,
    members: &[&EnrichedRecord],
    config: &OutlierConfig,
) -> Option<CrossValidationFinding> {
    let returns: Vec<(&str, Decimal)> = members
        .iter()
        .filter_map(|r| r.metrics.period_return.map(|pr| (r.record.account_id.as_str(), pr)))
        .collect();

    if returns.len() < config.min_sample {
        debug!(portfolio_id, sample = returns.len(), "too few returns for outlier check");
        return None;
    }

    let values: Vec<Decimal> = returns.iter().map(|(_, r)| *r).collect();
    let (mean, std_dev) = mean_and_std_dev(&values)?;
    let limit = config.sigma * std_dev;

    let mut outlier_accounts: Vec<String> = Vec::new();
    for (account_id, r) in &returns {
        if (r - mean).abs() > limit && !outlier_accounts.iter().any(|a| a == account_id) {
            outlier_accounts.push((*account_id).to_string());
        }
    }

    if outlier_accounts.is_empty() {
        return None;
    }

    Some(CrossValidationFinding {
        validation_type: ValidationType::ReturnOutlier,
        scope: portfolio_id.to_string(),
        issue: "Potential return outliers detected".into(),
        details: FindingDetails::ReturnOutlier {
            outlier_accounts,
            mean_return: mean,
            std_dev_return: std_dev,
            sigma: config.sigma,
        },
        severity: Severity::Warning,
    })
}

fn check_implausible_returns(
    portfolio_id: &str,
    members: &[&EnrichedRecord],
    max_abs_return: Decimal,
) -> Option<CrossValidationFinding> {
    let mut accounts: Vec<String> = Vec::new();
    for r in members {
        let implausible = r.metrics.period_return.is_some_and(|pr| pr.abs() > max_abs_return);
        if implausible && !accounts.iter().any(|a| *a == r.record.account_id) {
            accounts.push(r.record.account_id.clone());
        }
    }

    if accounts.is_empty() {
        return None;
    }

    Some(CrossValidationFinding {
        validation_type: ValidationType::ImplausibleReturn,
        scope: portfolio_id.to_string(),
        issue: format!("Period returns beyond ±{max_abs_return} detected"),
        details: FindingDetails::ImplausibleReturn {
            accounts,
            max_abs_return,
        },
        severity: Severity::Error,
    })
}
