//! Per-destination save statistics

use std::collections::BTreeMap;

use serde::Serialize;

use super::transaction::TransactionRow;

/// Outcome of one destination saving one batch
///
/// `added + existing + pending + other_skipped` need not equal `total`:
/// destinations may ignore rows outside their own window without counting
/// them anywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStats {
    /// Destination display name
    pub name: String,
    /// Table, file or budget the rows went to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Rows handed to the destination
    pub total: usize,
    /// Newly added rows
    pub added: usize,
    /// Rows skipped because they are still pending
    pub pending: usize,
    /// Rows already present in the destination
    pub existing: usize,
    /// Rows skipped for other reasons (unknown account, ignored by API, ...)
    pub other_skipped: usize,
    /// Named groups of rows the destination wants to call out
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub highlighted: BTreeMap<String, Vec<TransactionRow>>,
}

impl SaveStats {
    /// Fresh stats for a batch: `total` is the row count, `pending` counts pending rows
    pub fn new(name: impl Into<String>, table: Option<String>, rows: &[TransactionRow]) -> Self {
        Self {
            name: name.into(),
            table,
            total: rows.len(),
            pending: rows.iter().filter(|row| row.is_pending()).count(),
            ..Default::default()
        }
    }

    pub fn with_added(mut self, added: usize) -> Self {
        self.added = added;
        self
    }

    pub fn skipped(&self) -> usize {
        self.existing + self.pending + self.other_skipped
    }

    /// `"5 skipped (3 existing, 2 pending)"`, or empty when nothing was skipped
    pub fn skipped_summary(&self) -> String {
        let skipped = self.skipped();
        if skipped == 0 {
            return String::new();
        }

        let mut parts = Vec::new();
        if self.existing > 0 {
            parts.push(format!("{} existing", self.existing));
        }
        if self.pending > 0 {
            parts.push(format!("{} pending", self.pending));
        }
        if self.other_skipped > 0 {
            parts.push(format!("{} other", self.other_skipped));
        }
        format!("{} skipped ({})", skipped, parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompanyId, Transaction, TransactionStatus};
    use rust_decimal::Decimal;

    fn row(status: TransactionStatus) -> TransactionRow {
        let mut tx = Transaction::new("2024-01-01", Decimal::ONE, "x");
        tx.status = status;
        TransactionRow {
            transaction: tx,
            account: "1".into(),
            company_id: CompanyId::new("max"),
            hash: String::new(),
            unique_id: String::new(),
        }
    }

    #[test]
    fn test_new_counts_pending() {
        let rows = vec![
            row(TransactionStatus::Pending),
            row(TransactionStatus::Completed),
            row(TransactionStatus::Completed),
        ];
        let stats = SaveStats::new("Test", None, &rows);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.added, 0);
    }

    #[test]
    fn test_skipped_summary() {
        let mut stats = SaveStats::default();
        assert_eq!(stats.skipped_summary(), "");

        stats.existing = 3;
        stats.pending = 2;
        assert_eq!(stats.skipped_summary(), "5 skipped (3 existing, 2 pending)");

        stats.other_skipped = 1;
        assert_eq!(
            stats.skipped_summary(),
            "6 skipped (3 existing, 2 pending, 1 other)"
        );
    }
}
