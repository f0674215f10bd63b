//! Web POST destination - sends completed rows to an HTTP endpoint as JSON

use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use chrono_tz::Tz;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::WebPostSettings;
use crate::domain::identity::parse_date;
use crate::domain::result::{Error, Result};
use crate::domain::{SaveStats, TransactionRow};
use crate::ports::{SaveProgress, TransactionStorage};
use crate::services::messages::normalize_currency;

/// Name reported in the `scraped by` column
pub const SYSTEM_NAME: &str = "bankfeed";

/// Flat row shape the endpoint receives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub date: String,
    pub amount: Option<Decimal>,
    pub description: String,
    pub memo: String,
    pub category: String,
    pub account: String,
    pub hash: String,
    pub comment: String,
    #[serde(rename = "scraped at")]
    pub scraped_at: String,
    #[serde(rename = "scraped by")]
    pub scraped_by: String,
    pub identifier: String,
    #[serde(rename = "chargedCurrency")]
    pub charged_currency: Option<String>,
}

impl TableRow {
    /// `use_unique_id` picks the robust key over the legacy hash for the `hash` column;
    /// the date is rendered in `tz`
    pub fn from_row(row: &TransactionRow, use_unique_id: bool, tz: Tz) -> Self {
        let date = parse_date(row.date.as_deref(), tz)
            .map(|d| d.with_timezone(&tz).format("%d/%m/%Y").to_string())
            .unwrap_or_default();

        Self {
            date,
            amount: row.charged_amount,
            description: row.description.clone(),
            memo: row.memo.clone().unwrap_or_default(),
            category: row.category.clone().unwrap_or_default(),
            account: row.account.clone(),
            hash: if use_unique_id {
                row.unique_id.clone()
            } else {
                row.hash.clone()
            },
            comment: String::new(),
            scraped_at: Local::now().format("%Y-%m-%d").to_string(),
            scraped_by: SYSTEM_NAME.to_string(),
            identifier: row
                .identifier
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            charged_currency: normalize_currency(row.charged_currency.as_deref())
                .or_else(|| normalize_currency(Some(&row.original_currency))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostResponse {
    added: Option<usize>,
}

pub struct WebPostStorage {
    client: Client,
    url: String,
    authorization_token: Option<String>,
    use_unique_id: bool,
    timezone: Tz,
}

impl WebPostStorage {
    pub fn new(settings: &WebPostSettings, timezone: Tz) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: settings.url.clone().unwrap_or_default(),
            authorization_token: settings
                .authorization_token
                .clone()
                .filter(|t| !t.is_empty()),
            use_unique_id: settings.use_unique_id,
            timezone,
        })
    }

    /// A destination is usable only with a parseable URL
    pub fn is_valid_url(url: &str) -> bool {
        !url.is_empty() && url::Url::parse(url).is_ok()
    }
}

#[async_trait]
impl TransactionStorage for WebPostStorage {
    fn name(&self) -> &str {
        "WebPost"
    }

    fn can_save(&self) -> bool {
        Self::is_valid_url(&self.url)
    }

    async fn save_transactions(
        &self,
        rows: &[TransactionRow],
        progress: &dyn SaveProgress,
    ) -> Result<SaveStats> {
        let body: Vec<TableRow> = rows
            .iter()
            .filter(|r| !r.is_pending())
            .map(|r| TableRow::from_row(r, self.use_unique_id, self.timezone))
            .collect();
        info!(rows = body.len(), url = %self.url, "Posting transactions");

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.authorization_token {
            request = request.header("Authorization", token);
        }

        let (response, ()) = tokio::join!(request.send(), progress.step("Sending"));
        let response = response?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Failed to post transactions");
            return Err(Error::Http(format!(
                "Failed to post transactions: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            )));
        }

        let parsed: PostResponse = response.json().await.unwrap_or_default();
        let mut stats = SaveStats::new(self.name(), Some("web-post".to_string()), rows);
        stats.added = parsed.added.unwrap_or(body.len());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_http::MockHttpServer;
    use crate::domain::{tag_transaction, CompanyId, Transaction, TransactionIdentifier, TransactionStatus, DEFAULT_TIMEZONE};

    struct NoProgress;

    #[async_trait]
    impl SaveProgress for NoProgress {
        async fn step(&self, _name: &str) {}
    }

    fn rows() -> Vec<TransactionRow> {
        let mut completed = Transaction::new("2024-06-10T00:00:00.000Z", Decimal::new(-2000, 2), "Pharmacy");
        completed.identifier = Some(TransactionIdentifier::Number(77.into()));
        completed.charged_currency = Some("₪".to_string());
        let mut pending = Transaction::new("2024-06-11T00:00:00.000Z", Decimal::new(-500, 2), "Kiosk");
        pending.status = TransactionStatus::Pending;

        [completed, pending]
            .iter()
            .map(|tx| tag_transaction(tx, &CompanyId::new("max"), "4321", DEFAULT_TIMEZONE).unwrap())
            .collect()
    }

    fn settings(url: &str, token: Option<&str>) -> WebPostSettings {
        WebPostSettings {
            url: Some(url.to_string()),
            authorization_token: token.map(String::from),
            use_unique_id: false,
        }
    }

    #[test]
    fn test_table_row() {
        let rows = rows();
        let row = TableRow::from_row(&rows[0], false, DEFAULT_TIMEZONE);
        assert_eq!(row.date, "10/06/2024");
        assert_eq!(row.amount, Some(Decimal::new(-2000, 2)));
        assert_eq!(row.identifier, "77");
        assert_eq!(row.hash, rows[0].hash);
        assert_eq!(row.charged_currency.as_deref(), Some("ILS"));
        assert_eq!(row.scraped_by, SYSTEM_NAME);

        let row = TableRow::from_row(&rows[0], true, DEFAULT_TIMEZONE);
        assert_eq!(row.hash, rows[0].unique_id);
    }

    #[test]
    fn test_table_row_date_is_local() {
        let tx = Transaction::new("2024-06-10T22:30:00.000Z", Decimal::ONE, "Late night");
        let row = tag_transaction(&tx, &CompanyId::new("max"), "4321", DEFAULT_TIMEZONE).unwrap();
        assert_eq!(TableRow::from_row(&row, false, DEFAULT_TIMEZONE).date, "11/06/2024");
        assert_eq!(TableRow::from_row(&row, false, Tz::UTC).date, "10/06/2024");
    }

    #[test]
    fn test_can_save_requires_valid_url() {
        assert!(!WebPostStorage::new(&WebPostSettings::default(), DEFAULT_TIMEZONE).unwrap().can_save());
        assert!(!WebPostStorage::new(&settings("not a url", None), DEFAULT_TIMEZONE).unwrap().can_save());
        assert!(WebPostStorage::new(&settings("https://example.com/hook", None), DEFAULT_TIMEZONE)
            .unwrap()
            .can_save());
    }

    #[tokio::test]
    async fn test_posts_completed_rows_with_authorization() {
        let server = MockHttpServer::start(200, r#"{"added": 1}"#).unwrap();
        let storage =
            WebPostStorage::new(&settings(&server.url("/hook"), Some("Bearer abc")), DEFAULT_TIMEZONE)
                .unwrap();

        let stats = storage.save_transactions(&rows(), &NoProgress).await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.added, 1);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/hook");
        assert_eq!(requests[0].header("Authorization"), Some("Bearer abc"));
        let body = requests[0].json();
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["description"], "Pharmacy");
    }

    #[tokio::test]
    async fn test_added_falls_back_to_posted_count() {
        let server = MockHttpServer::start(200, "{}").unwrap();
        let storage = WebPostStorage::new(&settings(&server.url("/"), None), DEFAULT_TIMEZONE).unwrap();
        let stats = storage.save_transactions(&rows(), &NoProgress).await.unwrap();
        assert_eq!(stats.added, 1);
        assert!(server.requests()[0].header("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_error_status_fails_the_save() {
        let server = MockHttpServer::start(500, r#"{"error": "boom"}"#).unwrap();
        let storage = WebPostStorage::new(&settings(&server.url("/"), None), DEFAULT_TIMEZONE).unwrap();
        let error = storage.save_transactions(&rows(), &NoProgress).await.unwrap_err();
        assert!(error.to_string().contains("Internal Server Error"), "{}", error);
    }
}
