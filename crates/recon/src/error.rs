use chrono::NaiveDate;
use thiserror::Error;

/// Fatal errors. Anything that reaches the caller as a `ReconError` halts the
/// batch; undefined metrics and missing references are not errors.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (negative tolerance, unknown field, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// A vendor name that has no `[vendors.*]` table.
    #[error("unknown vendor: {0}")]
    UnknownVendor(String),

    /// Missing required column in input data.
    #[error("missing column '{column}' (tried: {tried})")]
    MissingColumn { column: String, tried: String },

    /// Required value is empty on a CSV row. `row` is the file line number,
    /// with the header on line 1.
    #[error("row {row}: missing required field '{field}'")]
    MissingField { row: usize, field: String },

    /// Required value is empty on an in-memory record. `index` is the record's
    /// zero-based position in the submitted batch.
    #[error("record {index}: missing required field '{field}'")]
    MissingRecordField { index: usize, field: String },

    /// Date parse error.
    #[error("row {row}, account '{account_id}': cannot parse date '{value}'")]
    DateParse {
        row: usize,
        account_id: String,
        value: String,
    },

    /// Amount parse error.
    #[error("row {row}, account '{account_id}': cannot parse {field} '{value}'")]
    AmountParse {
        row: usize,
        account_id: String,
        field: String,
        value: String,
    },

    /// Same (account, date) observed twice in one batch.
    #[error("duplicate observation for account '{account_id}' on {as_of_date}")]
    DuplicateObservation {
        account_id: String,
        as_of_date: NaiveDate,
    },

    /// Underlying CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
