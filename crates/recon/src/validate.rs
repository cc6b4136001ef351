//! Batch gate. Structurally invalid input never reaches the calculators.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::ReconError;
use crate::model::CanonicalRecord;

/// Reject empty account ids and duplicate (account, date) observations.
/// Returns the first problem found.
pub fn validate_batch(records: &[CanonicalRecord]) -> Result<(), ReconError> {
    let mut seen: HashSet<(&str, NaiveDate)> = HashSet::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        if record.account_id.trim().is_empty() {
            return Err(ReconError::MissingRecordField {
                index,
                field: "account_id".into(),
            });
        }

        if !seen.insert((record.account_id.as_str(), record.as_of_date)) {
            return Err(ReconError::DuplicateObservation {
                account_id: record.account_id.clone(),
                as_of_date: record.as_of_date,
            });
        }
    }

    Ok(())
}
