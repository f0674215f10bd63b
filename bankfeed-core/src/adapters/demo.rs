//! Demo scraper and browser
//!
//! Generates deterministic transactions so the whole pipeline can run
//! without a real site automation engine:
//! - salary on the 1st, rent on the 5th, utilities on the 10th
//! - a few daily card purchases picked by a seeded generator
//! - the last two days are pending, one purchase a week is in USD
//!
//! An account with a `demoError` credential (e.g. `"INVALID_PASSWORD"`)
//! fails with that error kind instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::debug;

use crate::domain::result::Result;
use crate::domain::{
    AccountConfig, CompanyId, ScrapeErrorKind, ScrapeResult, ScrapedAccount, Transaction,
    TransactionIdentifier, TransactionStatus,
};
use crate::ports::{
    BrowserContext, BrowserProvider, BrowserSession, ProgressListener, RequestFilter,
    ScrapeOptions, Scraper,
};

const MERCHANTS: &[(&str, i64)] = &[
    ("SHUFERSAL DEAL", -18_450),
    ("CAFE CAFE", -3_800),
    ("PAZ GAS STATION", -25_000),
    ("SUPER-PHARM", -7_990),
    ("WOLT", -11_200),
    ("RAV KAV TOP UP", -5_000),
];

/// Simple deterministic random number generator (LCG)
struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 32) as f64 / u32::MAX as f64
    }
}

/// Seed derived from the company id, so every company gets its own stream
fn seed_for(company_id: &CompanyId) -> u64 {
    company_id
        .as_str()
        .bytes()
        .fold(42u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

fn iso(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}

fn transaction(date: NaiveDate, cents: i64, description: &str, id: u64) -> Transaction {
    let mut tx = Transaction::new(iso(date), Decimal::new(cents, 2), description);
    tx.identifier = Some(TransactionIdentifier::Number(id.into()));
    tx
}

/// Generate the demo transactions for `company_id` between `start` and `today`
pub fn generate_demo_transactions(
    company_id: &CompanyId,
    start: NaiveDate,
    today: NaiveDate,
) -> Vec<Transaction> {
    let mut rng = SimpleRng::new(seed_for(company_id));
    let mut transactions = Vec::new();
    let mut id = seed_for(company_id) % 100_000;
    let mut date = start;

    while date <= today {
        id += 1;
        match date.day() {
            1 => transactions.push(transaction(date, 1_250_000, "ACME LTD SALARY", id)),
            5 => transactions.push(transaction(date, -520_000, "RENT PAYMENT", id)),
            10 => transactions.push(transaction(date, -34_500, "IEC ELECTRIC", id)),
            _ => {}
        }

        let purchases = (rng.next() * 3.0) as usize;
        for _ in 0..purchases {
            id += 1;
            let (merchant, cents) = MERCHANTS[(rng.next() * MERCHANTS.len() as f64) as usize % MERCHANTS.len()];
            let mut tx = transaction(date, cents, merchant, id);
            tx.memo = Some(format!("card {}", 1000 + id % 9000));

            if date.weekday().num_days_from_monday() == 6 && purchases == 1 {
                tx.original_currency = "USD".to_string();
                tx.original_amount = Decimal::new(cents / 4, 2);
                tx.charged_currency = Some("ILS".to_string());
            }
            if (today - date).num_days() < 2 {
                tx.status = TransactionStatus::Pending;
                tx.charged_amount = None;
            }
            tx.raw_transaction = Some(json!({ "demoId": id }));
            transactions.push(tx);
        }

        date += Duration::days(1);
    }
    transactions
}

/// Scraper producing [`generate_demo_transactions`] for every account
#[derive(Debug, Default)]
pub struct DemoScraper {
    today: Option<NaiveDate>,
}

impl DemoScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin "today" so output does not depend on the clock
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }
}

#[async_trait]
impl Scraper for DemoScraper {
    async fn scrape(
        &self,
        account: &AccountConfig,
        context: &dyn BrowserContext,
        options: &ScrapeOptions,
        progress: &dyn ProgressListener,
    ) -> Result<ScrapeResult> {
        let company_id = &account.company_id;
        let filter = context.filter();

        progress.on_progress(company_id, "START_SCRAPING").await;
        let login = format!("https://login.{}.demo/auth", company_id.as_str().to_lowercase());
        filter.page_navigated(&login);
        let blocked = filter.is_blocked("GET", "https://analytics.demo/collect");
        debug!(blocked, "Demo analytics request");

        progress.on_progress(company_id, "LOGGING_IN").await;
        if let Some(kind) = account.credentials.get("demoError") {
            let kind: ScrapeErrorKind =
                serde_json::from_value(kind.clone()).unwrap_or(ScrapeErrorKind::Generic);
            progress.on_progress(company_id, "LOGIN_FAILED").await;
            return Ok(ScrapeResult::failure(kind, format!("demo account configured to fail with {}", kind)));
        }

        progress.on_progress(company_id, "LOGIN_SUCCESS").await;
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let txns = generate_demo_transactions(company_id, options.start_date, today);

        progress.on_progress(company_id, "END_SCRAPING").await;
        Ok(ScrapeResult::Success {
            accounts: vec![ScrapedAccount {
                account_number: format!("{:04}", seed_for(company_id) % 10_000),
                txns,
            }],
        })
    }
}

/// Browser that provides contexts without driving any real browser
#[derive(Debug, Default)]
pub struct NoopBrowser;

struct NoopSession;

struct NoopContext {
    company_id: CompanyId,
    filter: Arc<dyn RequestFilter>,
}

impl BrowserContext for NoopContext {
    fn company_id(&self) -> &CompanyId {
        &self.company_id
    }

    fn filter(&self) -> &Arc<dyn RequestFilter> {
        &self.filter
    }
}

#[async_trait]
impl BrowserProvider for NoopBrowser {
    async fn create_session(&self) -> Result<Arc<dyn BrowserSession>> {
        Ok(Arc::new(NoopSession))
    }
}

#[async_trait]
impl BrowserSession for NoopSession {
    async fn create_context(
        &self,
        company_id: &CompanyId,
        filter: Arc<dyn RequestFilter>,
    ) -> Result<Box<dyn BrowserContext>> {
        Ok(Box::new(NoopContext {
            company_id: company_id.clone(),
            filter,
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
