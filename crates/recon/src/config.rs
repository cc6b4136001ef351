use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::mapping::CANONICAL_FIELDS;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Input CSV, relative to the config file.
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub return_basis: ReturnBasis,
    #[serde(default)]
    pub compounding: Compounding,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub outliers: OutlierConfig,
    #[serde(default)]
    pub vendors: BTreeMap<String, VendorConfig>,
}

/// Which calculated return is compared against the provider's return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnBasis {
    #[default]
    Period,
    Cumulative,
}

/// How the cumulative return is compounded. Both give the same numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compounding {
    /// `exp(sum(ln(1 + r))) - 1`, built only from running sums.
    #[default]
    LogSum,
    /// Running product of growth factors.
    Direct,
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

pub const DEFAULT_RETURN_TOLERANCE: Decimal = dec!(0.0001);
pub const DEFAULT_MARKET_VALUE_TOLERANCE: Decimal = dec!(0.01);
pub const DEFAULT_NET_FLOW_TOLERANCE: Decimal = dec!(0.01);
pub const DEFAULT_PERCENTAGE_TOLERANCE: Decimal = dec!(0.001);

/// Thresholds for one run. Read-only once loaded. A variance equal to the
/// threshold is within tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ToleranceConfig {
    /// Absolute, in return units (0.0001 = 1bp).
    #[serde(default = "default_return_tolerance", alias = "twrr_tolerance")]
    pub return_tolerance: Decimal,
    /// Absolute, in currency units.
    #[serde(default = "default_market_value_tolerance")]
    pub market_value_tolerance: Decimal,
    /// Absolute, in currency units.
    #[serde(default = "default_net_flow_tolerance", alias = "netflow_tolerance")]
    pub net_flow_tolerance: Decimal,
    /// Relative (0.001 = 0.1%).
    #[serde(default = "default_percentage_tolerance")]
    pub percentage_tolerance: Decimal,
}

fn default_return_tolerance() -> Decimal {
    DEFAULT_RETURN_TOLERANCE
}

fn default_market_value_tolerance() -> Decimal {
    DEFAULT_MARKET_VALUE_TOLERANCE
}

fn default_net_flow_tolerance() -> Decimal {
    DEFAULT_NET_FLOW_TOLERANCE
}

fn default_percentage_tolerance() -> Decimal {
    DEFAULT_PERCENTAGE_TOLERANCE
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            return_tolerance: DEFAULT_RETURN_TOLERANCE,
            market_value_tolerance: DEFAULT_MARKET_VALUE_TOLERANCE,
            net_flow_tolerance: DEFAULT_NET_FLOW_TOLERANCE,
            percentage_tolerance: DEFAULT_PERCENTAGE_TOLERANCE,
        }
    }
}

impl ToleranceConfig {
    /// Build from a flat key → threshold map, as kept in an external settings
    /// store. Missing keys keep their defaults; unknown keys are rejected.
    pub fn from_thresholds(thresholds: &HashMap<String, Decimal>) -> Result<Self, ReconError> {
        let mut config = Self::default();
        for (key, value) in thresholds {
            match key.as_str() {
                "return_tolerance" | "twrr_tolerance" => config.return_tolerance = *value,
                "market_value_tolerance" => config.market_value_tolerance = *value,
                "net_flow_tolerance" | "netflow_tolerance" => config.net_flow_tolerance = *value,
                "percentage_tolerance" => config.percentage_tolerance = *value,
                other => {
                    return Err(ReconError::ConfigValidation(format!(
                        "unknown tolerance key '{other}'"
                    )))
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let named = [
            ("return_tolerance", self.return_tolerance),
            ("market_value_tolerance", self.market_value_tolerance),
            ("net_flow_tolerance", self.net_flow_tolerance),
            ("percentage_tolerance", self.percentage_tolerance),
        ];
        for (name, value) in named {
            if value < Decimal::ZERO {
                return Err(ReconError::ConfigValidation(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cross-account statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct OutlierConfig {
    /// Standard deviations from the group mean before a return is flagged.
    #[serde(default = "default_sigma")]
    pub sigma: Decimal,
    /// Groups with fewer non-null returns are skipped.
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
    /// Absolute period return above which a record is an ERROR. Off when unset.
    #[serde(default)]
    pub max_abs_return: Option<Decimal>,
}

fn default_sigma() -> Decimal {
    dec!(3)
}

fn default_min_sample() -> usize {
    2
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            sigma: default_sigma(),
            min_sample: default_min_sample(),
            max_abs_return: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Vendor field mapping
// ---------------------------------------------------------------------------

/// Header synonyms for one provider's file layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorConfig {
    /// File-name prefixes that identify this vendor (case-insensitive).
    #[serde(default)]
    pub prefixes: Vec<String>,
    /// Canonical field → accepted header names, tried in order.
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub date_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with defaults everywhere; used when records arrive in memory.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: None,
            return_basis: ReturnBasis::default(),
            compounding: Compounding::default(),
            tolerance: ToleranceConfig::default(),
            outliers: OutlierConfig::default(),
            vendors: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        self.tolerance.validate()?;

        if self.outliers.sigma <= Decimal::ZERO {
            return Err(ReconError::ConfigValidation(format!(
                "outliers.sigma must be positive, got {}",
                self.outliers.sigma
            )));
        }
        if self.outliers.min_sample < 2 {
            return Err(ReconError::ConfigValidation(format!(
                "outliers.min_sample must be at least 2, got {}",
                self.outliers.min_sample
            )));
        }
        if let Some(max) = self.outliers.max_abs_return {
            if max <= Decimal::ZERO {
                return Err(ReconError::ConfigValidation(format!(
                    "outliers.max_abs_return must be positive, got {max}"
                )));
            }
        }

        for (vendor_name, vendor) in &self.vendors {
            for field in vendor.fields.keys() {
                if !CANONICAL_FIELDS.contains(&field.as_str()) {
                    return Err(ReconError::ConfigValidation(format!(
                        "vendor '{vendor_name}': unknown canonical field '{field}'"
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn vendor(&self, name: &str) -> Result<&VendorConfig, ReconError> {
        self.vendors
            .get(name)
            .ok_or_else(|| ReconError::UnknownVendor(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "Vendor A Monthly"
input = "vendor_a_2024_03.csv"
return_basis = "cumulative"

[tolerance]
return_tolerance = 0.0002
market_value_tolerance = 0.05
net_flow_tolerance = 0.01
percentage_tolerance = 0.001

[outliers]
sigma = 2.5
min_sample = 3

[vendors.vendor_a]
prefixes = ["vendor_a_", "va_"]
date_format = "%m/%d/%Y"

[vendors.vendor_a.fields]
account_id = ["acct_id", "account_number"]
reference_return = ["twr"]
"#;

    #[test]
    fn parse_valid() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Vendor A Monthly");
        assert_eq!(config.input.as_deref(), Some("vendor_a_2024_03.csv"));
        assert_eq!(config.return_basis, ReturnBasis::Cumulative);
        assert_eq!(config.compounding, Compounding::LogSum);
        assert_eq!(config.tolerance.return_tolerance, dec!(0.0002));
        assert_eq!(config.tolerance.market_value_tolerance, dec!(0.05));
        assert_eq!(config.outliers.sigma, dec!(2.5));
        assert_eq!(config.outliers.min_sample, 3);
        assert!(config.outliers.max_abs_return.is_none());

        let vendor = config.vendor("vendor_a").unwrap();
        assert_eq!(vendor.prefixes, vec!["vendor_a_", "va_"]);
        assert_eq!(vendor.date_format.as_deref(), Some("%m/%d/%Y"));
        assert_eq!(vendor.fields["reference_return"], vec!["twr"]);
    }

    #[test]
    fn defaults_when_sections_omitted() {
        let config = ReconConfig::from_toml("name = \"bare\"").unwrap();
        assert_eq!(config.tolerance, ToleranceConfig::default());
        assert_eq!(config.tolerance.return_tolerance, dec!(0.0001));
        assert_eq!(config.tolerance.market_value_tolerance, dec!(0.01));
        assert_eq!(config.outliers.sigma, dec!(3));
        assert_eq!(config.outliers.min_sample, 2);
        assert_eq!(config.return_basis, ReturnBasis::Period);
        assert!(config.vendors.is_empty());
    }

    #[test]
    fn legacy_tolerance_key_names_accepted() {
        let config = ReconConfig::from_toml(
            r#"
name = "legacy"
[tolerance]
twrr_tolerance = 0.0005
netflow_tolerance = 1.0
"#,
        )
        .unwrap();
        assert_eq!(config.tolerance.return_tolerance, dec!(0.0005));
        assert_eq!(config.tolerance.net_flow_tolerance, dec!(1));
        assert_eq!(config.tolerance.market_value_tolerance, dec!(0.01));
    }

    #[test]
    fn thresholds_from_key_value_map() {
        let mut map = HashMap::new();
        map.insert("twrr_tolerance".to_string(), dec!(0.0003));
        map.insert("market_value_tolerance".to_string(), dec!(0.5));
        let tol = ToleranceConfig::from_thresholds(&map).unwrap();
        assert_eq!(tol.return_tolerance, dec!(0.0003));
        assert_eq!(tol.market_value_tolerance, dec!(0.5));
        assert_eq!(tol.net_flow_tolerance, DEFAULT_NET_FLOW_TOLERANCE);
    }

    #[test]
    fn reject_unknown_threshold_key() {
        let mut map = HashMap::new();
        map.insert("fx_tolerance".to_string(), dec!(0.1));
        let err = ToleranceConfig::from_thresholds(&map).unwrap_err();
        assert!(err.to_string().contains("fx_tolerance"));
    }

    #[test]
    fn reject_negative_tolerance() {
        let err = ReconConfig::from_toml(
            r#"
name = "bad"
[tolerance]
market_value_tolerance = -0.01
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("market_value_tolerance"));
    }

    #[test]
    fn reject_bad_outlier_settings() {
        let err = ReconConfig::from_toml("name = \"bad\"\n[outliers]\nsigma = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("sigma"));

        let err =
            ReconConfig::from_toml("name = \"bad\"\n[outliers]\nmin_sample = 1\n").unwrap_err();
        assert!(err.to_string().contains("min_sample"));
    }

    #[test]
    fn reject_unknown_canonical_field() {
        let err = ReconConfig::from_toml(
            r#"
name = "bad"
[vendors.x.fields]
acount_id = ["acct"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("acount_id"));
    }

    #[test]
    fn reject_invalid_return_basis() {
        let err = ReconConfig::from_toml("name = \"bad\"\nreturn_basis = \"annual\"\n");
        assert!(err.is_err(), "typo in return_basis should fail deserialization");
    }

    #[test]
    fn unknown_vendor_lookup() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        let err = config.vendor("vendor_z").unwrap_err();
        assert!(matches!(err, ReconError::UnknownVendor(ref v) if v == "vendor_z"));
    }
}
