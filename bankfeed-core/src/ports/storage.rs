//! Storage destination port

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{SaveStats, TransactionRow};

/// Receives named steps as a destination works through a save
#[async_trait]
pub trait SaveProgress: Send + Sync {
    async fn step(&self, name: &str);
}

/// A destination transaction rows are persisted to
///
/// Every destination receives the full row set and applies its own
/// accept/skip/pending policy.
#[async_trait]
pub trait TransactionStorage: Send + Sync {
    /// Display name used in progress messages and reports
    fn name(&self) -> &str;

    /// Whether the destination is configured well enough to save
    fn can_save(&self) -> bool;

    async fn save_transactions(
        &self,
        rows: &[TransactionRow],
        progress: &dyn SaveProgress,
    ) -> Result<SaveStats>;
}
