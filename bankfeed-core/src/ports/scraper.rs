//! Scraping capability port

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::result::Result;
use crate::domain::{AccountConfig, CompanyId, ScrapeResult};
use super::browser::BrowserContext;

/// Options for scraping a single account
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub company_id: CompanyId,
    pub start_date: NaiveDate,
    /// How many months ahead to scrape (credit card future charges)
    pub future_months: Option<u32>,
    pub additional_transaction_information: bool,
}

/// Receives progress events emitted while a scrape runs
#[async_trait]
pub trait ProgressListener: Send + Sync {
    async fn on_progress(&self, company_id: &CompanyId, step: &str);
}

/// Site automation engine
///
/// Returning `Err` means the scrape crashed; the scheduler records it as a
/// generic (retryable) failure. Bank-reported failures such as bad
/// credentials come back as `Ok(ScrapeResult::Failure { .. })`.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(
        &self,
        account: &AccountConfig,
        context: &dyn BrowserContext,
        options: &ScrapeOptions,
        progress: &dyn ProgressListener,
    ) -> Result<ScrapeResult>;
}
