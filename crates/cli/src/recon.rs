//! `perfrecon run` and `perfrecon validate`: config-driven performance reconciliation.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use tracing::{debug, info};

use perfrecon_recon::config::VendorConfig;
use perfrecon_recon::{OverallStatus, ReconConfig, ReconError, ReconInput, ReconResult};

use crate::exit_codes::{
    EXIT_ERROR, EXIT_RECON_FAIL, EXIT_RECON_INVALID_CONFIG, EXIT_RECON_NO_DATA, EXIT_RECON_RUNTIME,
    EXIT_USAGE,
};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Reconcile a batch of account-period records against provider references
    #[command(after_help = "\
Examples:
  perfrecon run perf.recon.toml
  perfrecon run perf.recon.toml --input vendor_b_2024_03.csv
  perfrecon run perf.recon.toml --vendor vendor_a --json
  perfrecon run perf.recon.toml --output result.json")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Input CSV (defaults to the config's `input`, relative to the config file)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Vendor mapping to apply (defaults to detection by file-name prefix)
        #[arg(long)]
        vendor: Option<String>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  perfrecon validate perf.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run {
            config,
            input,
            vendor,
            json,
            output,
        } => cmd_recon_run(config, input, vendor, json, output),
        ReconCommands::Validate { config } => cmd_recon_validate(config),
    }
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError {
        code,
        message: msg.into(),
        hint: None,
    }
}

/// Engine errors are either bad input data or bad config.
fn engine_err(err: ReconError) -> CliError {
    let code = match &err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_INVALID_CONFIG,
        ReconError::UnknownVendor(_) => EXIT_USAGE,
        _ => EXIT_RECON_RUNTIME,
    };
    recon_err(code, err.to_string())
}

fn load_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str).map_err(engine_err)
}

fn resolve_input(config_path: &Path, config: &ReconConfig, input: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = input {
        return Ok(path);
    }
    // Config-relative, like every other path in a .recon.toml
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    match &config.input {
        Some(file) => Ok(base_dir.join(file)),
        None => Err(recon_err(EXIT_USAGE, "no input file")
            .with_hint("pass --input <csv> or set `input` in the config")),
    }
}

fn resolve_vendor<'a>(
    config: &'a ReconConfig,
    input_path: &Path,
    requested: Option<String>,
) -> Result<Option<(String, &'a VendorConfig)>, CliError> {
    if let Some(name) = requested {
        let vendor = config.vendor(&name).map_err(|e| {
            let known: Vec<&str> = config.vendors.keys().map(String::as_str).collect();
            engine_err(e).with_hint(format!("configured vendors: {}", known.join(", ")))
        })?;
        return Ok(Some((name, vendor)));
    }

    let file_name = input_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match perfrecon_recon::detect_vendor(&file_name, &config.vendors) {
        Some(name) => {
            let vendor = config.vendor(name).map_err(engine_err)?;
            info!(vendor = name, file = %file_name, "vendor detected from file name");
            Ok(Some((name.to_string(), vendor)))
        }
        None => {
            debug!(file = %file_name, "no vendor prefix matched; using canonical headers");
            Ok(None)
        }
    }
}

fn cmd_recon_run(
    config_path: PathBuf,
    input: Option<PathBuf>,
    vendor: Option<String>,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let input_path = resolve_input(&config_path, &config, input)?;
    let vendor = resolve_vendor(&config, &input_path, vendor)?;

    let csv_data = std::fs::read_to_string(&input_path).map_err(|e| {
        recon_err(EXIT_RECON_RUNTIME, format!("cannot read {}: {e}", input_path.display()))
    })?;
    let records = perfrecon_recon::load_csv_records(&csv_data, vendor.as_ref().map(|(_, v)| *v))
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("{}: {e}", input_path.display())))?;

    let input = ReconInput {
        records,
        vendor: vendor.map(|(name, _)| name),
        source_file: Some(input_path.display().to_string()),
    };

    let result = perfrecon_recon::run(&config, &input).map_err(engine_err)?;

    // Output
    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| recon_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    print_summary(&result);

    if result.meta.record_count == 0 {
        return Err(recon_err(EXIT_RECON_NO_DATA, "no records in input")
            .with_hint(format!("{} has a header but no data rows", input_path.display())));
    }
    if result.report.overall_status == OverallStatus::Fail {
        return Err(recon_err(EXIT_RECON_FAIL, "reconciliation failed"));
    }

    Ok(())
}

/// Human summary to stderr. Stdout is reserved for `--json`.
fn print_summary(result: &ReconResult) {
    let s = &result.report.summary;
    eprintln!(
        "recon '{}': {} records across {} accounts",
        result.meta.config_name, result.meta.record_count, result.meta.account_count,
    );
    eprintln!(
        "checks: {} total, {} passed, {} failed, {} indeterminate ({:.2}% pass)",
        s.total_checks, s.passed_checks, s.failed_checks, s.indeterminate_checks, s.pass_rate_percentage,
    );

    for (field, failures) in &result.report.failures_by_field {
        eprintln!(
            "  {field}: {} failed ({} within relative tolerance)",
            failures.checks.len(),
            failures.immaterial,
        );
    }

    if result.report.identity_breaks > 0 {
        eprintln!("identity breaks: {}", result.report.identity_breaks);
    }

    for f in &result.findings {
        eprintln!("{} [{}] {}: {}", f.severity, f.validation_type, f.scope, f.issue);
    }

    for r in &result.report.recommendations {
        eprintln!("- {r}");
    }

    eprintln!("status: {}", result.report.overall_status);
}

fn cmd_recon_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "valid: recon '{}' with {} vendor(s), {} return basis",
        config.name,
        config.vendors.len(),
        match config.return_basis {
            perfrecon_recon::config::ReturnBasis::Period => "period",
            perfrecon_recon::config::ReturnBasis::Cumulative => "cumulative",
        },
    );
    Ok(())
}
