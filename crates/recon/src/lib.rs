//! `perfrecon-recon`: performance calculation and reconciliation engine.
//!
//! Pure engine crate: receives canonical per-account, per-period records,
//! derives flows and time-weighted returns, checks them against provider
//! references and returns an auditable report. No CLI or file IO; CSV and
//! TOML helpers take `&str`.

pub mod config;
pub mod cross_account;
pub mod engine;
pub mod error;
pub mod identity;
pub mod mapping;
pub mod metrics;
pub mod model;
pub mod partition;
pub mod report;
pub mod tolerance;
pub mod validate;

pub use config::{ReconConfig, ToleranceConfig};
pub use engine::run;
pub use error::ReconError;
pub use mapping::{detect_vendor, load_csv_records};
pub use model::{
    CanonicalRecord, CheckField, CrossValidationFinding, DerivedMetrics, EnrichedRecord, IdentityCheck,
    OverallStatus, ReconInput, ReconResult, ReconciliationCheck, ReconciliationReport, Severity,
};
