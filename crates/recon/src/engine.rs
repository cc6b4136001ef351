use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ReconConfig;
use crate::cross_account::validate_portfolios;
use crate::error::ReconError;
use crate::identity;
use crate::metrics::compute_account_metrics;
use crate::model::{
    EnrichedRecord, IdentityCheck, ReconInput, ReconMeta, ReconResult, ReconciliationCheck,
};
use crate::partition::{partition_by_account, AccountPartition};
use crate::report::build_report;
use crate::tolerance;
use crate::validate::validate_batch;

/// Per-account output of the parallel phase.
struct AccountOutput {
    records: Vec<EnrichedRecord>,
    identity: Vec<IdentityCheck>,
    checks: Vec<ReconciliationCheck>,
}

/// Run one batch end to end. Returns enriched records, checks, findings and the report.
///
/// Accounts are processed in parallel. Cross-account validation starts only
/// once every account is done, and output is ordered by account then date.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    validate_batch(&input.records)?;

    let partitions = partition_by_account(&input.records);
    let account_count = partitions.len();
    info!(
        config = %config.name,
        records = input.records.len(),
        accounts = account_count,
        "reconciliation batch accepted"
    );

    let outputs: Vec<AccountOutput> = partitions
        .into_par_iter()
        .map(|partition| process_account(partition, config))
        .collect();

    let mut records = Vec::with_capacity(input.records.len());
    let mut identity = Vec::with_capacity(input.records.len());
    let mut checks = Vec::with_capacity(input.records.len() * 3);
    for out in outputs {
        records.extend(out.records);
        identity.extend(out.identity);
        checks.extend(out.checks);
    }

    let findings = validate_portfolios(&records, &config.outliers);
    let report = build_report(&checks, &findings, &identity, &config.tolerance);

    info!(
        status = %report.overall_status,
        pass_rate = report.summary.pass_rate_percentage,
        failed = report.summary.failed_checks,
        findings = findings.len(),
        "reconciliation complete"
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            vendor: input.vendor.clone(),
            source_file: input.source_file.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            record_count: records.len(),
            account_count,
        },
        records,
        identity,
        checks,
        findings,
        report,
    })
}

fn process_account(partition: AccountPartition, config: &ReconConfig) -> AccountOutput {
    let metrics = compute_account_metrics(&partition.records, config.compounding);
    let records: Vec<EnrichedRecord> = partition
        .records
        .into_iter()
        .zip(metrics)
        .map(|(record, metrics)| EnrichedRecord { record, metrics })
        .collect();

    let (identity, checks) = rayon::join(
        || identity::check_all(&records, &config.tolerance),
        || tolerance::check_all(&records, &config.tolerance, config.return_basis),
    );

    debug!(
        account_id = %partition.account_id,
        periods = records.len(),
        identity_breaks = identity.iter().filter(|c| !c.passed).count(),
        "account processed"
    );

    AccountOutput {
        records,
        identity,
        checks,
    }
}
