//! Bankfeed Core - scrape bank accounts and fan transactions out to storage
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Transaction, AccountScrapeResult, SaveStats) and identity keys
//! - **ports**: Trait definitions for external collaborators (Scraper, BrowserProvider, TransactionStorage)
//! - **services**: Domain firewall, scrape scheduler, save fan-out and the run pipeline
//! - **adapters**: Concrete implementations (DuckDB, local JSON, web post, Telegram, demo)

pub mod domain;
pub mod ports;
pub mod services;
pub mod adapters;
pub mod config;
pub mod migrations;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;

use adapters::registry::{build_channel, build_storages};
use config::Config;
use ports::{BrowserProvider, Scraper, TransactionStorage};
use services::{scrape_settings, DomainRuleEngine, Notifier, RunContext, RunPipeline};

// Re-export commonly used types at crate root
pub use domain::{
    AccountConfig, AccountScrapeResult, CompanyId, SaveStats, Transaction, TransactionRow,
};
pub use domain::result::Error;

/// Main context for bankfeed operations
///
/// Built once from the configuration. It holds the parsed domain rules,
/// the progress notifier and the active destinations; every run gets its
/// own [`RunPipeline`] from it.
pub struct BankfeedContext {
    pub config: Config,
    pub rules: Arc<DomainRuleEngine>,
    /// Timezone transaction dates are read in
    pub timezone: Tz,
    pub notifier: Notifier,
    pub storages: Vec<Arc<dyn TransactionStorage>>,
    /// Destinations that are configured but could not be set up
    pub storage_failures: Vec<(&'static str, Error)>,
}

impl BankfeedContext {
    /// Create a context from the bankfeed directory
    pub fn new(bankfeed_dir: &Path) -> Result<Self> {
        let config = Config::load(bankfeed_dir)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let timezone = config.scraping.tz().context("Invalid scraping.timezone")?;
        let rules = Arc::new(DomainRuleEngine::load(
            &config.security.firewall_settings,
            config.security.block_by_default,
        ));
        let channel = build_channel(&config).context("Failed to set up notifications")?;
        let active = build_storages(&config);

        Ok(Self {
            config,
            rules,
            timezone,
            notifier: Notifier::new(Some(channel)),
            storages: active.storages,
            storage_failures: active.failed,
        })
    }

    /// A pipeline for one run, scraping with `scraper` in `browser`
    pub fn pipeline(
        &self,
        scraper: Arc<dyn Scraper>,
        browser: Arc<dyn BrowserProvider>,
    ) -> Result<RunPipeline> {
        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        let settings = scrape_settings(&self.config.scraping, today)
            .context("Invalid scraping settings")?;

        Ok(RunPipeline::new(RunContext {
            accounts: self.config.accounts.clone(),
            settings,
            timezone: self.timezone,
            rules: Arc::clone(&self.rules),
            domain_tracking: self.config.scraping.domain_tracking,
            scraper,
            browser,
            storages: self.storages.clone(),
            notifier: self.notifier.clone(),
        }))
    }
}
