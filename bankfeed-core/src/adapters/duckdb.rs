//! DuckDB destination
//!
//! Completed rows go to `transactions`, keyed by `unique_id`; rows already
//! present are counted as existing. The scraper payload of every newly added
//! row goes to `raw_transactions`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use duckdb::{params, Connection};
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::{SaveStats, TransactionRow};
use crate::migrations::{BOOTSTRAP, MIGRATIONS};
use crate::ports::{SaveProgress, TransactionStorage};

const TABLE: &str = "transactions";

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl DuckDbStorage {
    /// Open (or create) the database file and apply pending migrations
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        let conn = loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => break conn,
                Err(e) if is_retryable_error(&e.to_string()) && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    warn!(
                        path = %db_path.display(),
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt + 1,
                        error = %e,
                        "Database busy, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path.to_path_buf()),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// In-memory database, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: None,
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Extension autoloading stays off; JSON is linked in through the "json" feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::storage("DuckDB connection lock poisoned"))
    }

    /// Apply every migration not yet recorded in `sys_migrations`
    ///
    /// Returns the names of the migrations applied by this call.
    pub fn run_migrations(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let tracked: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;

        let mut applied: Vec<String> = Vec::new();
        if tracked > 0 {
            let mut stmt = conn.prepare("SELECT migration_name FROM sys_migrations")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for name in names {
                applied.push(name?);
            }
        }

        let mut newly_applied = Vec::new();
        for &(name, sql) in MIGRATIONS {
            if applied.iter().any(|a| a == name) {
                continue;
            }
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO sys_migrations (migration_name, applied_at) VALUES (?, ?)",
                params![name, Utc::now().to_rfc3339()],
            )?;
            debug!(migration = name, bootstrap = name == BOOTSTRAP, "Applied migration");
            newly_applied.push(name.to_string());
        }
        Ok(newly_applied)
    }

    pub fn transaction_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?)
    }

    pub fn raw_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM raw_transactions", [], |row| row.get(0))?)
    }
}

/// Insert rows that are not stored yet, returning the ones that were added
fn insert_new(conn: &mut Connection, rows: &[TransactionRow]) -> Result<Vec<TransactionRow>> {
    let scraped_at = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let mut added = Vec::new();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO transactions (unique_id, hash, company_id, account, date, processed_date,
                                       description, memo, original_amount, original_currency,
                                       charged_amount, charged_currency, status, type,
                                       identifier, category, scraped_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (unique_id) DO NOTHING",
        )?;

        for row in rows {
            let changed = stmt.execute(params![
                row.unique_id,
                row.hash,
                row.company_id.as_str(),
                row.account,
                row.date.clone().unwrap_or_default(),
                row.processed_date,
                row.description,
                row.memo,
                row.original_amount.to_f64().unwrap_or(0.0),
                row.original_currency,
                row.charged_amount.and_then(|a| a.to_f64()),
                row.charged_currency,
                row.status.as_str(),
                row.kind.as_str(),
                row.identifier.as_ref().map(ToString::to_string),
                row.category,
                scraped_at,
            ])?;
            if changed > 0 {
                added.push(row.clone());
            }
        }
    }
    tx.commit()?;
    Ok(added)
}

fn insert_raw(conn: &mut Connection, rows: &[TransactionRow]) -> Result<()> {
    let scraped_at = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO raw_transactions (unique_id, payload, scraped_at) VALUES (?, ?, ?)
             ON CONFLICT (unique_id) DO NOTHING",
        )?;
        for row in rows {
            stmt.execute(params![row.unique_id, serde_json::to_string(row)?, scraped_at])?;
        }
    }
    tx.commit()?;
    Ok(())
}

impl DuckDbStorage {
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| Error::storage("DuckDB connection lock poisoned"))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| Error::storage(format!("DuckDB task failed: {}", e)))?
    }
}

#[async_trait]
impl TransactionStorage for DuckDbStorage {
    fn name(&self) -> &str {
        "DuckDB"
    }

    fn can_save(&self) -> bool {
        true
    }

    async fn save_transactions(
        &self,
        rows: &[TransactionRow],
        progress: &dyn SaveProgress,
    ) -> Result<SaveStats> {
        let mut stats = SaveStats::new(self.name(), Some(TABLE.to_string()), rows);
        let completed: Vec<TransactionRow> =
            rows.iter().filter(|r| !r.is_pending()).cloned().collect();
        let candidates = completed.len();

        progress.step("Inserting transactions").await;
        let added = self.blocking(move |conn| insert_new(conn, &completed)).await?;
        stats.added = added.len();
        stats.existing = candidates - added.len();

        if !added.is_empty() {
            progress.step("Saving raw data").await;
            self.blocking(move |conn| insert_raw(conn, &added)).await?;
        }

        info!(
            path = ?self.db_path,
            added = stats.added,
            existing = stats.existing,
            pending = stats.pending,
            "Saved to DuckDB"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{tag_transaction, CompanyId, Transaction, TransactionStatus, DEFAULT_TIMEZONE};
    use rust_decimal::Decimal;
    use serde_json::json;
    use tempfile::TempDir;

    struct NoProgress;

    #[async_trait]
    impl SaveProgress for NoProgress {
        async fn step(&self, _name: &str) {}
    }

    fn row(description: &str, status: TransactionStatus) -> TransactionRow {
        let mut tx = Transaction::new("2024-04-02T09:15:00.000Z", Decimal::new(-4590, 2), description);
        tx.status = status;
        tx.raw_transaction = Some(json!({"ref": description}));
        tag_transaction(&tx, &CompanyId::new("visaCal"), "5555", DEFAULT_TIMEZONE).unwrap()
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let storage = DuckDbStorage::in_memory().unwrap();
        assert!(storage.run_migrations().unwrap().is_empty());
        assert_eq!(storage.transaction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_counts_added_existing_and_pending() {
        let storage = DuckDbStorage::in_memory().unwrap();
        let rows = vec![
            row("Groceries", TransactionStatus::Completed),
            row("Fuel", TransactionStatus::Completed),
            row("Pending coffee", TransactionStatus::Pending),
        ];

        let first = storage.save_transactions(&rows, &NoProgress).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.added, 2);
        assert_eq!(first.pending, 1);
        assert_eq!(first.existing, 0);
        assert_eq!(first.table.as_deref(), Some("transactions"));

        let second = storage.save_transactions(&rows, &NoProgress).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.existing, 2);

        assert_eq!(storage.transaction_count().unwrap(), 2);
        assert_eq!(storage.raw_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("bankfeed.duckdb");

        {
            let storage = DuckDbStorage::open(&path).unwrap();
            storage
                .save_transactions(&[row("Rent", TransactionStatus::Completed)], &NoProgress)
                .await
                .unwrap();
        }

        let reopened = DuckDbStorage::open(&path).unwrap();
        assert_eq!(reopened.transaction_count().unwrap(), 1);
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: Database is locked"));
        assert!(is_retryable_error("Resource temporarily unavailable"));
        assert!(!is_retryable_error("Catalog Error: table not found"));
    }
}
