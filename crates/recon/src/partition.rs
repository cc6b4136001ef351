use std::collections::BTreeMap;

use crate::model::CanonicalRecord;

/// All observations for one account, oldest first.
#[derive(Debug, Clone)]
pub struct AccountPartition {
    pub account_id: String,
    pub records: Vec<CanonicalRecord>,
}

/// Group records by account and sort each group by `as_of_date`.
/// Accounts come back in id order so the output is stable run to run.
pub fn partition_by_account(records: &[CanonicalRecord]) -> Vec<AccountPartition> {
    let mut groups: BTreeMap<&str, Vec<CanonicalRecord>> = BTreeMap::new();

    for record in records {
        groups
            .entry(record.account_id.as_str())
            .or_default()
            .push(record.clone());
    }

    groups
        .into_iter()
        .map(|(account_id, mut records)| {
            records.sort_by_key(|r| r.as_of_date);
            AccountPartition {
                account_id: account_id.to_string(),
                records,
            }
        })
        .collect()
}
