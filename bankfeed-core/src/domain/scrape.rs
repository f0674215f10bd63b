//! Scrape result model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::account::CompanyId;
use super::transaction::Transaction;

/// Failure classes a scraper can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeErrorKind {
    InvalidPassword,
    ChangePassword,
    AccountBlocked,
    Timeout,
    Generic,
    #[serde(rename = "GENERAL_ERROR")]
    General,
    TwoFactorRetrieverMissing,
}

impl ScrapeErrorKind {
    /// Failures that no amount of retrying will fix
    ///
    /// Retrying bad credentials risks locking the account.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InvalidPassword | Self::ChangePassword | Self::AccountBlocked
        )
    }
}

impl fmt::Display for ScrapeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::ChangePassword => "CHANGE_PASSWORD",
            Self::AccountBlocked => "ACCOUNT_BLOCKED",
            Self::Timeout => "TIMEOUT",
            Self::Generic => "GENERIC",
            Self::General => "GENERAL_ERROR",
            Self::TwoFactorRetrieverMissing => "TWO_FACTOR_RETRIEVER_MISSING",
        };
        f.write_str(s)
    }
}

/// One bank account found while scraping a company login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedAccount {
    pub account_number: String,
    #[serde(default)]
    pub txns: Vec<Transaction>,
}

/// Outcome of scraping one configured account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "success")]
pub enum ScrapeResult {
    #[serde(rename = "true")]
    Success { accounts: Vec<ScrapedAccount> },
    #[serde(rename = "false")]
    Failure {
        #[serde(rename = "errorType")]
        error_kind: ScrapeErrorKind,
        #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ScrapeResult {
    pub fn failure(error_kind: ScrapeErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            error_kind,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Scraped accounts, empty for failures
    pub fn accounts(&self) -> &[ScrapedAccount] {
        match self {
            Self::Success { accounts } => accounts,
            Self::Failure { .. } => &[],
        }
    }
}

/// Per-account result produced by the scheduler, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountScrapeResult {
    pub company_id: CompanyId,
    pub result: ScrapeResult,
    /// Number of scrape attempts made (1 unless a retry happened)
    pub attempts: u32,
}

impl AccountScrapeResult {
    pub fn transaction_count(&self) -> usize {
        self.result.accounts().iter().map(|a| a.txns.len()).sum()
    }
}
