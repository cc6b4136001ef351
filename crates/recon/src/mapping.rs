//! Vendor header mapping and CSV loading into [`CanonicalRecord`]s.
//!
//! Each vendor table lists header synonyms per canonical field; matching is
//! case-insensitive and the first synonym present wins. The engine itself only
//! ever sees canonical records.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::VendorConfig;
use crate::error::ReconError;
use crate::model::CanonicalRecord;

pub const CANONICAL_FIELDS: &[&str] = &[
    "account_id",
    "portfolio_id",
    "as_of_date",
    "beginning_market_value",
    "ending_market_value",
    "contributions",
    "distributions",
    "income",
    "appreciation",
    "fees",
    "other_adjustments",
    "reported_net_flow",
    "reference_return",
    "benchmark_return",
];

const REQUIRED_FIELDS: &[&str] = &[
    "account_id",
    "as_of_date",
    "beginning_market_value",
    "ending_market_value",
];

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Pick the vendor whose file-name prefix matches. Vendors are tried in name order.
pub fn detect_vendor<'a>(file_name: &str, vendors: &'a BTreeMap<String, VendorConfig>) -> Option<&'a str> {
    let lower = file_name.to_lowercase();
    vendors
        .iter()
        .find(|(_, v)| v.prefixes.iter().any(|p| lower.starts_with(&p.to_lowercase())))
        .map(|(name, _)| name.as_str())
}

/// Resolved canonical field → column index for one header row.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    columns: BTreeMap<&'static str, usize>,
}

impl ColumnIndex {
    pub fn resolve(headers: &[String], vendor: Option<&VendorConfig>) -> Result<Self, ReconError> {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut columns = BTreeMap::new();

        for &field in CANONICAL_FIELDS {
            let candidates = synonyms(field, vendor);
            let found = candidates
                .iter()
                .find_map(|name| lowered.iter().position(|h| *h == name.to_lowercase()));

            match found {
                Some(idx) => {
                    columns.insert(field, idx);
                }
                None if REQUIRED_FIELDS.contains(&field) => {
                    return Err(ReconError::MissingColumn {
                        column: field.to_string(),
                        tried: candidates.join(", "),
                    });
                }
                None => debug!(field, "optional column not present"),
            }
        }

        Ok(Self { columns })
    }

    pub fn get(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }
}

fn synonyms(field: &str, vendor: Option<&VendorConfig>) -> Vec<String> {
    match vendor.and_then(|v| v.fields.get(field)) {
        Some(names) if !names.is_empty() => names.clone(),
        _ => vec![field.to_string()],
    }
}

/// Parse a CSV batch using the vendor's header synonyms (or canonical names).
pub fn load_csv_records(csv_data: &str, vendor: Option<&VendorConfig>) -> Result<Vec<CanonicalRecord>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let index = ColumnIndex::resolve(&headers, vendor)?;
    let date_format = vendor
        .and_then(|v| v.date_format.as_deref())
        .unwrap_or(DEFAULT_DATE_FORMAT);

    let mut records = Vec::new();

    for (i, row) in reader.records().enumerate() {
        let row = row?;
        // Header is line 1.
        let line = i + 2;
        let cell = |field: &str| cell_value(&row, &index, field);

        let account_id = cell("account_id").to_string();
        if account_id.is_empty() {
            return Err(ReconError::MissingField {
                row: line,
                field: "account_id".into(),
            });
        }

        let date_str = cell("as_of_date");
        if date_str.is_empty() {
            return Err(ReconError::MissingField {
                row: line,
                field: "as_of_date".into(),
            });
        }
        let as_of_date = NaiveDate::parse_from_str(date_str, date_format).map_err(|_| ReconError::DateParse {
            row: line,
            account_id: account_id.clone(),
            value: date_str.into(),
        })?;

        let amount = |field: &str| -> Result<Option<Decimal>, ReconError> {
            parse_amount(cell(field)).map_err(|value| ReconError::AmountParse {
                row: line,
                account_id: account_id.clone(),
                field: field.into(),
                value,
            })
        };
        let required = |field: &str| -> Result<Decimal, ReconError> {
            amount(field)?.ok_or_else(|| ReconError::MissingField {
                row: line,
                field: field.into(),
            })
        };

        let portfolio_id = Some(cell("portfolio_id"))
            .filter(|p| !p.is_empty())
            .map(String::from);

        records.push(CanonicalRecord {
            portfolio_id,
            as_of_date,
            beginning_market_value: required("beginning_market_value")?,
            ending_market_value: required("ending_market_value")?,
            contributions: amount("contributions")?,
            distributions: amount("distributions")?,
            income: amount("income")?,
            appreciation: amount("appreciation")?,
            fees: amount("fees")?,
            other_adjustments: amount("other_adjustments")?,
            reported_net_flow: amount("reported_net_flow")?,
            reference_return: amount("reference_return")?,
            benchmark_return: amount("benchmark_return")?,
            account_id: account_id.clone(),
        });
    }

    Ok(records)
}

fn cell_value<'r>(row: &'r csv::StringRecord, index: &ColumnIndex, field: &str) -> &'r str {
    index.get(field).and_then(|idx| row.get(idx)).unwrap_or("")
}

/// Empty cell → `None`. Accepts an optional sign, then an optional `$`, then
/// a number whose integer part may use comma thousands separators
/// (`-$1,250.00`). Exponent notation is accepted for returns (`1.5e-3`).
/// Anything else is an error carrying the raw cell.
fn parse_amount(raw: &str) -> Result<Option<Decimal>, String> {
    if raw.is_empty() {
        return Ok(None);
    }

    let (sign, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.strip_prefix('+').unwrap_or(raw)),
    };
    let number = unsigned.strip_prefix('$').unwrap_or(unsigned);
    let (int_part, frac_part) = match number.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (number, None),
    };
    let int_digits = strip_thousands(int_part).ok_or_else(|| raw.to_string())?;

    let cleaned = match frac_part {
        Some(frac) => format!("{sign}{int_digits}.{frac}"),
        None => format!("{sign}{int_digits}"),
    };
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(Some)
        .map_err(|_| raw.to_string())
}

/// `1,234,567` → `1234567`. Groups after the first must be exactly three digits.
fn strip_thousands(int_part: &str) -> Option<String> {
    if !int_part.contains(',') {
        return Some(int_part.to_string());
    }

    let all_digits = |g: &str| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit());
    let mut groups = int_part.split(',');
    let lead = groups.next()?;
    if !all_digits(lead) || lead.len() > 3 {
        return None;
    }

    let mut digits = lead.to_string();
    for group in groups {
        if group.len() != 3 || !all_digits(group) {
            return None;
        }
        digits.push_str(group);
    }
    Some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn vendor_a() -> VendorConfig {
        let mut fields = BTreeMap::new();
        fields.insert("account_id".to_string(), vec!["Acct_ID".to_string(), "account_number".to_string()]);
        fields.insert("as_of_date".to_string(), vec!["period_end".to_string()]);
        fields.insert("beginning_market_value".to_string(), vec!["beginning_mv".to_string()]);
        fields.insert("ending_market_value".to_string(), vec!["ending_mv".to_string()]);
        fields.insert("reference_return".to_string(), vec!["twr".to_string()]);
        VendorConfig {
            prefixes: vec!["vendor_a_".into(), "va_".into()],
            fields,
            date_format: Some("%m/%d/%Y".into()),
        }
    }

    #[test]
    fn canonical_headers_without_vendor() {
        let csv = "\
account_id,portfolio_id,as_of_date,beginning_market_value,ending_market_value,contributions,distributions,reference_return
ACC-1,P1,2024-01-31,100000,105000,5000,2000,0.0345
ACC-2,,2024-01-31,0,1000,,,
";
        let records = load_csv_records(csv, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].account_id, "ACC-1");
        assert_eq!(records[0].portfolio_id.as_deref(), Some("P1"));
        assert_eq!(records[0].contributions, Some(dec!(5000)));
        assert_eq!(records[0].reference_return, Some(dec!(0.0345)));
        assert_eq!(records[0].income, None);
        assert_eq!(records[1].portfolio_id, None);
        assert_eq!(records[1].contributions, None);
    }

    #[test]
    fn vendor_synonyms_case_insensitive() {
        let csv = "\
ACCOUNT_NUMBER,Period_End,Beginning_MV,Ending_MV,TWR
VA-77,03/31/2024,\"1,250.00\",$1300.50,0.0404
";
        let records = load_csv_records(csv, Some(&vendor_a())).unwrap();
        assert_eq!(records[0].account_id, "VA-77");
        assert_eq!(records[0].as_of_date, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert_eq!(records[0].beginning_market_value, dec!(1250.00));
        assert_eq!(records[0].ending_market_value, dec!(1300.50));
        assert_eq!(records[0].reference_return, Some(dec!(0.0404)));
    }

    #[test]
    fn missing_required_column() {
        let csv = "account_id,as_of_date,ending_market_value\nA,2024-01-31,1\n";
        let err = load_csv_records(csv, None).unwrap_err();
        assert!(matches!(err, ReconError::MissingColumn { ref column, .. } if column == "beginning_market_value"));
    }

    #[test]
    fn blank_account_id_rejected() {
        let csv = "account_id,as_of_date,beginning_market_value,ending_market_value\n,2024-01-31,1,1\n";
        let err = load_csv_records(csv, None).unwrap_err();
        assert!(matches!(err, ReconError::MissingField { row: 2, ref field } if field == "account_id"));
    }

    #[test]
    fn bad_date_rejected() {
        let csv = "account_id,as_of_date,beginning_market_value,ending_market_value\nA,31/01/2024,1,1\n";
        let err = load_csv_records(csv, None).unwrap_err();
        assert!(matches!(err, ReconError::DateParse { .. }));
    }

    #[test]
    fn bad_amount_rejected() {
        let csv = "account_id,as_of_date,beginning_market_value,ending_market_value,fees\nA,2024-01-31,1,1,abc\n";
        let err = load_csv_records(csv, None).unwrap_err();
        assert!(err.to_string().contains("fees"));
    }

    #[test]
    fn amount_formats_accepted() {
        assert_eq!(parse_amount(""), Ok(None));
        assert_eq!(parse_amount("1234.5"), Ok(Some(dec!(1234.5))));
        assert_eq!(parse_amount("1,234,567.89"), Ok(Some(dec!(1234567.89))));
        assert_eq!(parse_amount("$1,000"), Ok(Some(dec!(1000))));
        assert_eq!(parse_amount("-$1,250.00"), Ok(Some(dec!(-1250.00))));
        assert_eq!(parse_amount("+12.5"), Ok(Some(dec!(12.5))));
        assert_eq!(parse_amount("0.000123"), Ok(Some(dec!(0.000123))));
        assert_eq!(parse_amount("1.5e-3"), Ok(Some(dec!(0.0015))));
    }

    #[test]
    fn malformed_amounts_rejected() {
        for raw in ["1,2,3", "12$5", "1,23", ",123", "1234,567", "1,234.5,6", "$", "-", "5$", "1..2", "abc"] {
            assert_eq!(parse_amount(raw), Err(raw.to_string()), "{raw}");
        }
    }

    #[test]
    fn stray_separator_names_row_and_field() {
        let csv = "account_id,as_of_date,beginning_market_value,ending_market_value\nA,2024-01-31,1,\"1,2,3\"\n";
        let err = load_csv_records(csv, None).unwrap_err();
        assert!(matches!(
            err,
            ReconError::AmountParse { row: 2, ref field, ref value, .. }
                if field == "ending_market_value" && value == "1,2,3"
        ));
    }

    #[test]
    fn blank_required_amount_rejected() {
        let csv = "account_id,as_of_date,beginning_market_value,ending_market_value\nA,2024-01-31,,1\n";
        let err = load_csv_records(csv, None).unwrap_err();
        assert!(matches!(err, ReconError::MissingField { ref field, .. } if field == "beginning_market_value"));
    }

    #[test]
    fn vendor_detected_by_prefix() {
        let mut vendors = BTreeMap::new();
        vendors.insert("vendor_a".to_string(), vendor_a());
        vendors.insert(
            "vendor_b".to_string(),
            VendorConfig {
                prefixes: vec!["vb_".into()],
                ..VendorConfig::default()
            },
        );
        assert_eq!(detect_vendor("VA_2024_03.csv", &vendors), Some("vendor_a"));
        assert_eq!(detect_vendor("vb_march.csv", &vendors), Some("vendor_b"));
        assert_eq!(detect_vendor("other.csv", &vendors), None);
    }
}
