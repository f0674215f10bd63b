//! Scrape scheduler - runs one scrape task per account on a bounded pool
//!
//! Each task owns one slot of a shared status board, so tasks never write
//! each other's status. Results come back in input order regardless of
//! completion order, and per-account failures become failure results
//! instead of errors.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use crate::domain::result::Error;
use crate::domain::{AccountConfig, AccountScrapeResult, CompanyId, ScrapeErrorKind, ScrapeResult};
use crate::ports::{
    BrowserProvider, BrowserSession, MessageHandle, ProgressListener, ScrapeOptions, Scraper,
};
use super::firewall::{DomainGuard, DomainRuleEngine, DomainTracker};
use super::notifier::Notifier;

/// When to retry a failed scrape
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per account, including the first one
    pub max_attempts: u32,
    pub is_retryable: fn(&ScrapeErrorKind) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            is_retryable: |kind| !kind.is_terminal(),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Whether attempt number `attempt` (1-based) that failed with `kind` gets another go
    pub fn should_retry(&self, attempt: u32, kind: &ScrapeErrorKind) -> bool {
        attempt < self.max_attempts && (self.is_retryable)(kind)
    }
}

/// Receives status changes and lifecycle errors from the scheduler
#[async_trait]
pub trait ScrapeObserver: Send + Sync {
    /// Called with every slot's current line; `total` is set once, after the last task
    async fn status_changed(&self, status: &[String], total: Option<Duration>);

    async fn error(&self, error: &Error, caller: &str);
}

/// Observer that only logs
pub struct LogObserver;

#[async_trait]
impl ScrapeObserver for LogObserver {
    async fn status_changed(&self, _status: &[String], total: Option<Duration>) {
        if let Some(total) = total {
            info!(took_secs = total.as_secs_f64(), "Scraping finished");
        }
    }

    async fn error(&self, error: &Error, caller: &str) {
        error!(caller, error = %error, "Scrape lifecycle error");
    }
}

/// Observer that keeps one progress message up to date
pub struct NotifierObserver {
    notifier: Notifier,
    handle: tokio::sync::Mutex<Option<MessageHandle>>,
}

impl NotifierObserver {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            notifier,
            handle: tokio::sync::Mutex::new(None),
        }
    }
}

pub fn status_text(status: &[String], total: Option<Duration>) -> String {
    let mut text = status.join("\n");
    if let Some(total) = total {
        text.push_str(&format!("\n\nTotal time: {:.1} seconds", total.as_secs_f64()));
    }
    text
}

#[async_trait]
impl ScrapeObserver for NotifierObserver {
    async fn status_changed(&self, status: &[String], total: Option<Duration>) {
        let text = status_text(status, total);
        // Held across the post so concurrent first updates share one message
        let mut handle = self.handle.lock().await;
        match *handle {
            Some(existing) => self.notifier.edit(Some(existing), &text).await,
            None => *handle = self.notifier.send(&text).await,
        }
    }

    async fn error(&self, error: &Error, caller: &str) {
        self.notifier.send_error(error, caller).await;
    }
}

/// Per-run status lines, one slot per account
struct StatusBoard {
    slots: Mutex<Vec<String>>,
}

impl StatusBoard {
    fn new(len: usize) -> Self {
        Self {
            slots: Mutex::new(vec![String::new(); len]),
        }
    }

    fn update(&self, slot: usize, f: impl FnOnce(&mut String)) -> Vec<String> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(line) = slots.get_mut(slot) {
            f(line);
        }
        slots.clone()
    }

    fn set(&self, slot: usize, text: String) -> Vec<String> {
        self.update(slot, |line| *line = text)
    }

    fn snapshot(&self) -> Vec<String> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Forwards a scraper's progress events into its own status slot
struct SlotProgress<'a> {
    slot: usize,
    board: &'a StatusBoard,
    observer: &'a dyn ScrapeObserver,
}

#[async_trait]
impl ProgressListener for SlotProgress<'_> {
    async fn on_progress(&self, company_id: &CompanyId, step: &str) {
        let status = self.board.set(self.slot, format!("[{}] {}", company_id, step));
        self.observer.status_changed(&status, None).await;
    }
}

/// Per-run scraping parameters
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub start_date: NaiveDate,
    pub future_months: Option<u32>,
    pub parallel_scrapers: usize,
    pub additional_transaction_information: bool,
    pub retry: RetryPolicy,
}

impl ScrapeSettings {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            future_months: None,
            parallel_scrapers: 1,
            additional_transaction_information: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Runs every account's scrape against one shared browser session
pub struct ScrapeScheduler {
    scraper: Arc<dyn Scraper>,
    browser: Arc<dyn BrowserProvider>,
    rules: Arc<DomainRuleEngine>,
    tracker: Option<Arc<DomainTracker>>,
}

impl ScrapeScheduler {
    pub fn new(
        scraper: Arc<dyn Scraper>,
        browser: Arc<dyn BrowserProvider>,
        rules: Arc<DomainRuleEngine>,
        tracker: Option<Arc<DomainTracker>>,
    ) -> Self {
        Self {
            scraper,
            browser,
            rules,
            tracker,
        }
    }

    /// Scrape all accounts; the result has one entry per account, in input order
    pub async fn run(
        &self,
        accounts: &[AccountConfig],
        settings: &ScrapeSettings,
        observer: &dyn ScrapeObserver,
    ) -> Vec<AccountScrapeResult> {
        let started = Instant::now();
        let limit = settings.parallel_scrapers.max(1);
        info!(accounts = accounts.len(), parallel = limit, "Scraping accounts");

        let session = match self.browser.create_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Failed to create browser session");
                observer.error(&e, "createSession").await;
                return accounts
                    .iter()
                    .map(|account| AccountScrapeResult {
                        company_id: account.company_id.clone(),
                        result: ScrapeResult::failure(ScrapeErrorKind::Generic, e.to_string()),
                        attempts: 0,
                    })
                    .collect();
            }
        };

        let board = StatusBoard::new(accounts.len());
        let board_ref = &board;
        let session_ref: &dyn BrowserSession = session.as_ref();
        let mut results: Vec<(usize, AccountScrapeResult)> =
            stream::iter(accounts.iter().enumerate())
                .map(move |(slot, account)| {
                    let span = info_span!("scrape", account = slot, company = %account.company_id);
                    let task =
                        self.scrape_account(slot, account, settings, session_ref, board_ref, observer);
                    async move { (slot, task.instrument(span).await) }
                })
                .buffer_unordered(limit)
                .collect()
                .await;
        results.sort_by_key(|(slot, _)| *slot);

        let total = started.elapsed();
        observer.status_changed(&board.snapshot(), Some(total)).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close browser session");
            observer.error(&e, "browser.close").await;
        }

        let results: Vec<AccountScrapeResult> = results.into_iter().map(|(_, r)| r).collect();
        info!(
            accounts = results.iter().map(|r| r.result.accounts().len()).sum::<usize>(),
            transactions = results.iter().map(AccountScrapeResult::transaction_count).sum::<usize>(),
            failed = results.iter().filter(|r| !r.result.is_success()).count(),
            took_secs = total.as_secs_f64(),
            "Scraping done"
        );
        results
    }

    async fn scrape_account(
        &self,
        slot: usize,
        account: &AccountConfig,
        settings: &ScrapeSettings,
        session: &dyn BrowserSession,
        board: &StatusBoard,
        observer: &dyn ScrapeObserver,
    ) -> AccountScrapeResult {
        let company_id = &account.company_id;
        let started = Instant::now();
        let options = ScrapeOptions {
            company_id: company_id.clone(),
            start_date: settings.start_date,
            future_months: settings.future_months,
            additional_transaction_information: settings.additional_transaction_information,
        };
        let progress = SlotProgress {
            slot,
            board,
            observer,
        };

        let status = board.set(slot, format!("[{}] starting", company_id));
        observer.status_changed(&status, None).await;

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let result = self.attempt(account, session, &options, &progress, observer).await;

            let retry_kind = match &result {
                ScrapeResult::Failure { error_kind, .. }
                    if settings.retry.should_retry(attempt, error_kind) =>
                {
                    Some(*error_kind)
                }
                _ => None,
            };
            let Some(retry_kind) = retry_kind else {
                break result;
            };
            warn!(attempt, kind = %retry_kind, "Scrape failed, retrying");
            let status = board.set(slot, format!("[{}] retrying after {}", company_id, retry_kind));
            observer.status_changed(&status, None).await;
        };

        match &result {
            ScrapeResult::Success { accounts } => info!(
                attempt,
                accounts = accounts.len(),
                transactions = accounts.iter().map(|a| a.txns.len()).sum::<usize>(),
                "Scrape succeeded"
            ),
            ScrapeResult::Failure { error_kind, message } => {
                warn!(attempt, kind = %error_kind, message = ?message, "Scrape failed")
            }
        }

        let took = started.elapsed();
        let status = board.update(slot, |line| {
            line.push_str(&format!(", took {:.1}s", took.as_secs_f64()))
        });
        observer.status_changed(&status, None).await;

        AccountScrapeResult {
            company_id: company_id.clone(),
            result,
            attempts: attempt,
        }
    }

    async fn attempt(
        &self,
        account: &AccountConfig,
        session: &dyn BrowserSession,
        options: &ScrapeOptions,
        progress: &SlotProgress<'_>,
        observer: &dyn ScrapeObserver,
    ) -> ScrapeResult {
        let company_id = &account.company_id;
        let guard = Arc::new(DomainGuard::new(
            self.rules.clone(),
            company_id.clone(),
            self.tracker.clone(),
        ));

        let context = match session.create_context(company_id, guard).await {
            Ok(context) => context,
            Err(e) => {
                error!(error = %e, "Failed to create browser context");
                observer.error(&e, "createContext").await;
                return ScrapeResult::failure(ScrapeErrorKind::Generic, e.to_string());
            }
        };

        // A panicking scraper must not unwind past the session teardown
        let scrape = self.scraper.scrape(account, context.as_ref(), options, progress);
        match AssertUnwindSafe(scrape).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ScrapeResult::failure(ScrapeErrorKind::Generic, e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(message = %message, "Scraper panicked");
                ScrapeResult::failure(
                    ScrapeErrorKind::Generic,
                    format!("scraper panicked: {}", message),
                )
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
