//! Save fan-out - hands every tagged row to every enabled destination
//!
//! Destinations run concurrently and independently: one failing is
//! reported under its own name and never delays or cancels the others.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::domain::{tag_transaction, AccountScrapeResult, SaveStats, TransactionRow};
use crate::ports::{MessageHandle, SaveProgress, TransactionStorage};
use super::messages::{saving_message, stats_message};
use super::notifier::Notifier;

/// A named step a destination reported while saving
#[derive(Debug, Clone)]
pub struct StepTimer {
    name: String,
    started: Instant,
    took: Option<Duration>,
}

impl StepTimer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
            took: None,
        }
    }

    /// Stop the timer; ending twice keeps the first duration
    pub fn end(&mut self) {
        if self.took.is_none() {
            self.took = Some(self.started.elapsed());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn took(&self) -> Option<Duration> {
        self.took
    }
}

impl fmt::Display for StepTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.took {
            Some(took) => write!(f, "{}, took {:.2}s", self.name, took.as_secs_f64()),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Tracks one destination's steps and mirrors them to its progress message
struct StepTracker<'a> {
    name: &'a str,
    notifier: &'a Notifier,
    handle: Option<MessageHandle>,
    steps: Mutex<Vec<StepTimer>>,
}

impl<'a> StepTracker<'a> {
    fn new(name: &'a str, notifier: &'a Notifier, handle: Option<MessageHandle>) -> Self {
        Self {
            name,
            notifier,
            handle,
            steps: Mutex::new(Vec::new()),
        }
    }

    /// End the running step and return every step so far
    fn finish(&self) -> Vec<StepTimer> {
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = steps.last_mut() {
            last.end();
        }
        steps.clone()
    }
}

#[async_trait]
impl SaveProgress for StepTracker<'_> {
    async fn step(&self, name: &str) {
        let text = {
            let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(last) = steps.last_mut() {
                last.end();
            }
            steps.push(StepTimer::start(name));
            saving_message(self.name, &steps)
        };
        info!(destination = self.name, step = name, "Save step");
        self.notifier.edit(self.handle, &text).await;
    }
}

/// How one destination's save ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum DestinationOutcome {
    Saved {
        stats: SaveStats,
        #[serde(serialize_with = "serialize_secs")]
        duration: Duration,
        steps: Vec<String>,
    },
    Failed {
        error: String,
    },
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Per-destination outcomes of one save, keyed by destination name
#[derive(Debug, Clone, Default, Serialize)]
pub struct SaveReport {
    pub destinations: BTreeMap<String, DestinationOutcome>,
}

impl SaveReport {
    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Stats of every destination that saved successfully
    pub fn stats(&self) -> BTreeMap<&str, &SaveStats> {
        self.destinations
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                DestinationOutcome::Saved { stats, .. } => Some((name.as_str(), stats)),
                DestinationOutcome::Failed { .. } => None,
            })
            .collect()
    }

    pub fn failures(&self) -> BTreeMap<&str, &str> {
        self.destinations
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                DestinationOutcome::Failed { error } => Some((name.as_str(), error.as_str())),
                DestinationOutcome::Saved { .. } => None,
            })
            .collect()
    }
}

/// Fans rows out to every destination that can save
pub struct SaveCoordinator {
    storages: Vec<Arc<dyn TransactionStorage>>,
    notifier: Notifier,
}

impl SaveCoordinator {
    pub fn new(storages: Vec<Arc<dyn TransactionStorage>>, notifier: Notifier) -> Self {
        Self { storages, notifier }
    }

    /// Names of the destinations that would receive rows
    pub fn active_destinations(&self) -> Vec<&str> {
        self.storages
            .iter()
            .filter(|s| s.can_save())
            .map(|s| s.name())
            .collect()
    }

    pub async fn persist(&self, rows: &[TransactionRow]) -> SaveReport {
        let storages: Vec<&Arc<dyn TransactionStorage>> =
            self.storages.iter().filter(|s| s.can_save()).collect();

        if storages.is_empty() || rows.is_empty() {
            info!(
                destinations = storages.len(),
                rows = rows.len(),
                "Nothing to save"
            );
            self.notifier
                .send(&format!(
                    "😶 No {} to save",
                    if rows.is_empty() { "transactions" } else { "destinations" }
                ))
                .await;
            return SaveReport::default();
        }

        info!(
            destinations = storages.len(),
            rows = rows.len(),
            "Saving transactions"
        );
        let outcomes = join_all(storages.into_iter().map(|storage| self.save_one(storage, rows))).await;

        SaveReport {
            destinations: outcomes.into_iter().collect(),
        }
    }

    async fn save_one(
        &self,
        storage: &Arc<dyn TransactionStorage>,
        rows: &[TransactionRow],
    ) -> (String, DestinationOutcome) {
        let name = storage.name().to_string();
        let handle = self.notifier.send(&saving_message(&name, &[])).await;
        let tracker = StepTracker::new(&name, &self.notifier, handle);

        let started = Instant::now();
        let result = storage.save_transactions(rows, &tracker).await;
        let duration = started.elapsed();
        let steps = tracker.finish();

        let outcome = match result {
            Ok(stats) => {
                info!(
                    destination = %name,
                    added = stats.added,
                    skipped = stats.skipped(),
                    took_ms = duration.as_millis() as u64,
                    "Saved transactions"
                );
                self.notifier
                    .edit(handle, &stats_message(&stats, duration, &steps))
                    .await;
                DestinationOutcome::Saved {
                    stats,
                    duration,
                    steps: steps.iter().map(ToString::to_string).collect(),
                }
            }
            Err(e) => {
                error!(destination = %name, error = %e, "Failed to save transactions");
                self.notifier
                    .send_error(&e, &format!("saveTransactions::{}", name))
                    .await;
                DestinationOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        (name, outcome)
    }
}

/// Tag every scraped transaction, skipping and reporting the malformed ones
pub async fn rows_from_results(
    results: &[AccountScrapeResult],
    timezone: Tz,
    notifier: &Notifier,
) -> Vec<TransactionRow> {
    let mut rows = Vec::new();
    for result in results {
        for account in result.result.accounts() {
            for tx in &account.txns {
                match tag_transaction(tx, &result.company_id, &account.account_number, timezone) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        warn!(
                            company = %result.company_id,
                            account = %account.account_number,
                            description = %tx.description,
                            error = %e,
                            "Skipping malformed transaction"
                        );
                        let caller = format!(
                            "resultsToTransactions::{}::{}",
                            result.company_id, account.account_number
                        );
                        let detail = format!(
                            "{}\n{}",
                            e,
                            serde_json::to_string(tx).unwrap_or_default()
                        );
                        notifier.send_error(&detail, &caller).await;
                    }
                }
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::result::{Error, Result};
    use crate::domain::{CompanyId, ScrapeResult, ScrapedAccount, Transaction, DEFAULT_TIMEZONE};
    use crate::services::notifier::tests::RecordingChannel;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStorage {
        name: &'static str,
        enabled: bool,
        delay: Duration,
        fail: bool,
        steps: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeStorage {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                enabled: true,
                delay: Duration::ZERO,
                fail: false,
                steps: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TransactionStorage for FakeStorage {
        fn name(&self) -> &str {
            self.name
        }

        fn can_save(&self) -> bool {
            self.enabled
        }

        async fn save_transactions(
            &self,
            rows: &[TransactionRow],
            progress: &dyn SaveProgress,
        ) -> Result<SaveStats> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for step in &self.steps {
                progress.step(step).await;
            }
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::storage("connection refused"));
            }
            Ok(SaveStats::new(self.name, None, rows).with_added(rows.len()))
        }
    }

    fn rows(count: usize) -> Vec<TransactionRow> {
        (0..count)
            .map(|i| {
                let tx = Transaction::new(
                    "2024-03-01T08:00:00.000Z",
                    Decimal::new(-100 * (i as i64 + 1), 2),
                    format!("tx {}", i),
                );
                tag_transaction(&tx, &CompanyId::new("max"), "1111", DEFAULT_TIMEZONE).unwrap()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_destination_does_not_delay_others() {
        let mut failing = FakeStorage::new("first");
        failing.fail = true;
        failing.delay = Duration::from_secs(2);
        let mut ok = FakeStorage::new("second");
        ok.delay = Duration::from_secs(3);

        let failing = Arc::new(failing);
        let ok = Arc::new(ok);
        let coordinator = SaveCoordinator::new(
            vec![failing.clone(), ok.clone()],
            Notifier::disabled(),
        );

        let started = Instant::now();
        let report = coordinator.persist(&rows(3)).await;
        let elapsed = started.elapsed();

        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.stats()["second"].added, 3);
        assert!(report.failures()["first"].contains("connection refused"));
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_short_circuits_without_rows_or_destinations() {
        let storage = Arc::new(FakeStorage::new("only"));
        let coordinator = SaveCoordinator::new(vec![storage.clone()], Notifier::disabled());
        assert!(coordinator.persist(&[]).await.is_empty());
        assert_eq!(storage.calls.load(Ordering::SeqCst), 0);

        let mut disabled = FakeStorage::new("disabled");
        disabled.enabled = false;
        let disabled = Arc::new(disabled);
        let coordinator = SaveCoordinator::new(vec![disabled.clone()], Notifier::disabled());
        assert!(coordinator.active_destinations().is_empty());
        assert!(coordinator.persist(&rows(2)).await.is_empty());
        assert_eq!(disabled.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steps_are_timed_and_reported() {
        let channel = Arc::new(RecordingChannel::default());
        let mut storage = FakeStorage::new("Sheets");
        storage.steps = vec!["Loading existing", "Appending"];
        let coordinator = SaveCoordinator::new(
            vec![Arc::new(storage)],
            Notifier::new(Some(channel.clone())),
        );

        let report = coordinator.persist(&rows(1)).await;

        match &report.destinations["Sheets"] {
            DestinationOutcome::Saved { steps, .. } => {
                assert_eq!(steps.len(), 2);
                assert!(steps[0].starts_with("Loading existing, took "));
                assert!(steps[1].starts_with("Appending, took "));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let posts = channel.posts.lock().unwrap();
        assert_eq!(posts[0], "📝 Sheets Saving...");
        let edits = channel.edits.lock().unwrap();
        assert_eq!(edits.len(), 3);
        assert!(edits[1].1.contains("\tLoading existing, took"));
        assert!(edits[1].1.ends_with("\tAppending"));
        assert!(edits[2].1.contains("1 added"));
    }

    #[tokio::test]
    async fn test_failure_is_reported_with_destination_name() {
        let channel = Arc::new(RecordingChannel::default());
        let mut storage = FakeStorage::new("WebPost");
        storage.fail = true;
        let coordinator = SaveCoordinator::new(
            vec![Arc::new(storage)],
            Notifier::new(Some(channel.clone())),
        );

        coordinator.persist(&rows(1)).await;

        let posts = channel.posts.lock().unwrap();
        assert!(posts
            .iter()
            .any(|p| p.starts_with("saveTransactions::WebPost\n❌ ")));
    }

    #[test]
    fn test_step_timer_display() {
        let mut timer = StepTimer::start("Uploading");
        assert_eq!(timer.to_string(), "Uploading");
        timer.end();
        assert!(timer.to_string().starts_with("Uploading, took "));
        assert!(timer.took().is_some());
    }

    #[tokio::test]
    async fn test_malformed_transactions_are_skipped() {
        let broken = Transaction::new("not a date", Decimal::ONE, "broken");
        let good = Transaction::new("2024-03-01", Decimal::ONE, "good");
        let results = vec![AccountScrapeResult {
            company_id: CompanyId::new("isracard"),
            result: ScrapeResult::Success {
                accounts: vec![ScrapedAccount {
                    account_number: "9".to_string(),
                    txns: vec![broken, good],
                }],
            },
            attempts: 1,
        }];

        let channel = Arc::new(RecordingChannel::default());
        let rows = rows_from_results(
            &results,
            DEFAULT_TIMEZONE,
            &Notifier::new(Some(channel.clone())),
        )
        .await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "good");
        let posts = channel.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].starts_with("resultsToTransactions::isracard::9\n❌ Invalid transaction date"));
        assert!(posts[0].contains("\"description\":\"broken\""));
    }
}
