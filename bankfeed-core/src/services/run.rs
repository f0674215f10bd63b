//! One pipeline run: scrape every account, tag the rows, fan them out
//!
//! A [`RunPipeline`] is built once per run from a [`RunContext`] and is
//! consumed by [`RunPipeline::run`], so nothing outlives the run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::info;

use crate::config::ScrapingSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{AccountConfig, AccountScrapeResult, CompanyId};
use crate::ports::{BrowserProvider, Scraper, TransactionStorage};
use super::firewall::{CompanyDomains, DomainRuleEngine, DomainTracker};
use super::messages::scrape_summary;
use super::notifier::Notifier;
use super::save::{rows_from_results, SaveCoordinator, SaveReport};
use super::scrape::{
    LogObserver, NotifierObserver, RetryPolicy, ScrapeObserver, ScrapeScheduler, ScrapeSettings,
};

/// Phases of a run, in the only order they can happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    Pending,
    Scraping,
    Deduplicating,
    Saving,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Scraping => "scraping",
            Self::Deduplicating => "deduplicating",
            Self::Saving => "saving",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Forward-only phase tracker
#[derive(Debug)]
struct PhaseLog {
    visited: Vec<RunPhase>,
}

impl PhaseLog {
    fn new() -> Self {
        Self {
            visited: vec![RunPhase::Pending],
        }
    }

    fn current(&self) -> RunPhase {
        self.visited.last().copied().unwrap_or(RunPhase::Pending)
    }

    fn advance(&mut self, next: RunPhase) {
        let current = self.current();
        debug_assert!(next > current, "run phase {} after {}", next, current);
        if next > current {
            info!(from = %current, to = %next, "Run phase");
            self.visited.push(next);
        }
    }
}

/// Everything one run needs, built once and handed to the pipeline
pub struct RunContext {
    pub accounts: Vec<AccountConfig>,
    pub settings: ScrapeSettings,
    /// Timezone transaction dates are read in
    pub timezone: Tz,
    pub rules: Arc<DomainRuleEngine>,
    /// Record the domains every scrape touched
    pub domain_tracking: bool,
    pub scraper: Arc<dyn Scraper>,
    pub browser: Arc<dyn BrowserProvider>,
    pub storages: Vec<Arc<dyn TransactionStorage>>,
    pub notifier: Notifier,
}

/// Outcome of a full run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub results: Vec<AccountScrapeResult>,
    /// Rows tagged and handed to the destinations
    pub rows: usize,
    pub save: SaveReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_domains: Option<BTreeMap<CompanyId, CompanyDomains>>,
    pub phases: Vec<RunPhase>,
}

/// Outcome of a scrape-only run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub results: Vec<AccountScrapeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_domains: Option<BTreeMap<CompanyId, CompanyDomains>>,
}

pub struct RunPipeline {
    accounts: Vec<AccountConfig>,
    settings: ScrapeSettings,
    timezone: Tz,
    scheduler: ScrapeScheduler,
    coordinator: SaveCoordinator,
    notifier: Notifier,
    tracker: Option<Arc<DomainTracker>>,
}

impl RunPipeline {
    pub fn new(context: RunContext) -> Self {
        let tracker = context
            .domain_tracking
            .then(|| Arc::new(DomainTracker::new()));
        let scheduler = ScrapeScheduler::new(
            context.scraper,
            context.browser,
            context.rules,
            tracker.clone(),
        );
        let coordinator = SaveCoordinator::new(context.storages, context.notifier.clone());

        Self {
            accounts: context.accounts,
            settings: context.settings,
            timezone: context.timezone,
            scheduler,
            coordinator,
            notifier: context.notifier,
            tracker,
        }
    }

    /// Names of the destinations this run would save to
    pub fn destinations(&self) -> Vec<&str> {
        self.coordinator.active_destinations()
    }

    /// Scrape every account and post the summary, without saving
    pub async fn scrape(self) -> ScrapeReport {
        let results = self.scrape_accounts().await;
        ScrapeReport {
            results,
            used_domains: self.tracker.as_ref().map(|t| t.report()),
        }
    }

    /// Scrape, tag and save
    pub async fn run(self) -> RunReport {
        let mut phases = PhaseLog::new();

        phases.advance(RunPhase::Scraping);
        let results = self.scrape_accounts().await;

        phases.advance(RunPhase::Deduplicating);
        let rows = rows_from_results(&results, self.timezone, &self.notifier).await;
        info!(rows = rows.len(), "Tagged transactions");

        phases.advance(RunPhase::Saving);
        let save = self.coordinator.persist(&rows).await;

        phases.advance(RunPhase::Done);
        RunReport {
            results,
            rows: rows.len(),
            save,
            used_domains: self.tracker.as_ref().map(|t| t.report()),
            phases: phases.visited,
        }
    }

    async fn scrape_accounts(&self) -> Vec<AccountScrapeResult> {
        let observer: Box<dyn ScrapeObserver> = if self.notifier.is_enabled() {
            Box::new(NotifierObserver::new(self.notifier.clone()))
        } else {
            Box::new(LogObserver)
        };

        let results = self
            .scheduler
            .run(&self.accounts, &self.settings, observer.as_ref())
            .await;
        self.notifier.send(&scrape_summary(&results)).await;
        results
    }
}

/// Scrape parameters for a run starting `days_back` days before `today`
pub fn scrape_settings(scraping: &ScrapingSettings, today: NaiveDate) -> Result<ScrapeSettings> {
    let start_date = Duration::try_days(scraping.days_back)
        .and_then(|back| today.checked_sub_signed(back))
        .ok_or_else(|| {
            Error::Config(format!("daysBack {} is out of range", scraping.days_back))
        })?;

    Ok(ScrapeSettings {
        start_date,
        future_months: scraping.future_months,
        parallel_scrapers: scraping.parallel_scrapers,
        additional_transaction_information: scraping.additional_transaction_information,
        retry: RetryPolicy::default().with_max_attempts(scraping.max_attempts),
    })
}
