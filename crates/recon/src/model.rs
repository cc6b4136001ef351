use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One account, one reporting period, already normalized to canonical names.
/// Amounts and returns are exact decimals, as read from the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_id: Option<String>,
    pub as_of_date: NaiveDate,
    pub beginning_market_value: Decimal,
    pub ending_market_value: Decimal,
    #[serde(default)]
    pub contributions: Option<Decimal>,
    #[serde(default)]
    pub distributions: Option<Decimal>,
    #[serde(default)]
    pub income: Option<Decimal>,
    #[serde(default)]
    pub appreciation: Option<Decimal>,
    #[serde(default)]
    pub fees: Option<Decimal>,
    #[serde(default)]
    pub other_adjustments: Option<Decimal>,
    /// Net flow as stated by the provider, when the file carries one.
    #[serde(default)]
    pub reported_net_flow: Option<Decimal>,
    #[serde(default)]
    pub reference_return: Option<Decimal>,
    #[serde(default)]
    pub benchmark_return: Option<Decimal>,
}

impl CanonicalRecord {
    /// Bare record with only the required fields set.
    pub fn new(
        account_id: impl Into<String>,
        as_of_date: NaiveDate,
        beginning_market_value: Decimal,
        ending_market_value: Decimal,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            portfolio_id: None,
            as_of_date,
            beginning_market_value,
            ending_market_value,
            contributions: None,
            distributions: None,
            income: None,
            appreciation: None,
            fees: None,
            other_adjustments: None,
            reported_net_flow: None,
            reference_return: None,
            benchmark_return: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub net_flow: Decimal,
    pub adjusted_beginning_market_value: Decimal,
    /// `None` when the adjusted base is not positive.
    pub period_return: Option<Decimal>,
    /// `None` once the account's compounding chain has been broken.
    pub cumulative_return: Option<Decimal>,
    pub cumulative_net_flow: Decimal,
    pub excess_return: Option<Decimal>,
}

/// A record plus the metrics derived from it. The record itself is never touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub metrics: DerivedMetrics,
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckField {
    MarketValue,
    Return,
    NetFlow,
}

impl std::fmt::Display for CheckField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketValue => write!(f, "marketValue"),
            Self::Return => write!(f, "return"),
            Self::NetFlow => write!(f, "netFlow"),
        }
    }
}

/// One row per (account, date, field).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationCheck {
    pub account_id: String,
    pub as_of_date: NaiveDate,
    pub field: CheckField,
    pub calculated_value: Option<Decimal>,
    pub reference_value: Option<Decimal>,
    pub variance: Option<Decimal>,
    pub relative_variance: Option<Decimal>,
    pub threshold: Decimal,
    /// `None` means indeterminate: one side was missing.
    pub within_tolerance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Market-value roll-forward result for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityCheck {
    pub account_id: String,
    pub as_of_date: NaiveDate,
    pub expected_ending_market_value: Decimal,
    pub reported_ending_market_value: Decimal,
    pub variance: Decimal,
    pub threshold: Decimal,
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// Cross-account findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationType {
    PortfolioDateConsistency,
    ReturnOutlier,
    ImplausibleReturn,
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortfolioDateConsistency => write!(f, "portfolioDateConsistency"),
            Self::ReturnOutlier => write!(f, "returnOutlier"),
            Self::ImplausibleReturn => write!(f, "implausibleReturn"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FindingDetails {
    DateConsistency {
        unique_dates: usize,
        total_accounts: usize,
    },
    ReturnOutlier {
        outlier_accounts: Vec<String>,
        mean_return: Decimal,
        std_dev_return: Decimal,
        sigma: Decimal,
    },
    ImplausibleReturn {
        accounts: Vec<String>,
        max_abs_return: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationFinding {
    pub validation_type: ValidationType,
    pub scope: String,
    pub issue: String,
    pub details: FindingDetails,
    pub severity: Severity,
}

// ---------------------------------------------------------------------------
// Report + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub indeterminate_checks: usize,
    pub pass_rate_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFailures {
    /// Failed checks whose relative variance still fits the percentage tolerance.
    pub immaterial: usize,
    pub checks: Vec<ReconciliationCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub summary: ReportSummary,
    pub failures_by_field: BTreeMap<CheckField, FieldFailures>,
    pub validation_summary: BTreeMap<Severity, usize>,
    pub identity_breaks: usize,
    pub overall_status: OverallStatus,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub engine_version: String,
    pub run_at: String,
    pub record_count: usize,
    pub account_count: usize,
}

/// Everything produced for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub records: Vec<EnrichedRecord>,
    pub identity: Vec<IdentityCheck>,
    pub checks: Vec<ReconciliationCheck>,
    pub findings: Vec<CrossValidationFinding>,
    pub report: ReconciliationReport,
}

/// Pre-loaded batch plus provenance for the result metadata.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub records: Vec<CanonicalRecord>,
    pub vendor: Option<String>,
    pub source_file: Option<String>,
}
