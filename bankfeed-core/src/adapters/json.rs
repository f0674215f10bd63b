//! Local JSON destination - writes each batch to a timestamped file

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::info;

use crate::domain::result::Result;
use crate::domain::{SaveStats, TransactionRow};
use crate::ports::{SaveProgress, TransactionStorage};

pub struct LocalJsonStorage {
    folder: PathBuf,
    enabled: bool,
}

impl LocalJsonStorage {
    pub fn new(folder: PathBuf, enabled: bool) -> Self {
        Self { folder, enabled }
    }

    /// `2024-01-01T10_00_00.000Z.json`; colons are not portable in file names
    fn file_name() -> String {
        format!(
            "{}.json",
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .replace(':', "_")
        )
    }
}

#[async_trait]
impl TransactionStorage for LocalJsonStorage {
    fn name(&self) -> &str {
        "LocalJson"
    }

    fn can_save(&self) -> bool {
        self.enabled
    }

    async fn save_transactions(
        &self,
        rows: &[TransactionRow],
        progress: &dyn SaveProgress,
    ) -> Result<SaveStats> {
        tokio::fs::create_dir_all(&self.folder).await?;
        let path = self.folder.join(Self::file_name());

        progress.step("Writing file").await;
        let content = serde_json::to_vec(rows)?;
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), rows = rows.len(), "Wrote transactions file");

        Ok(SaveStats::new(self.name(), Some(path.display().to_string()), rows).with_added(rows.len()))
    }
}
