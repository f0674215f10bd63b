//! Transaction domain model

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::account::CompanyId;

/// Settlement status reported by the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

/// Transaction kind reported by the bank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Normal,
    Installments,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Installments => "installments",
        }
    }
}

/// Installment progress for installment transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentInfo {
    pub number: u32,
    pub total: u32,
}

/// Bank-side identifier; banks send either numbers or strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionIdentifier {
    Number(serde_json::Number),
    Text(String),
}

impl TransactionIdentifier {
    /// Whether the identifier carries a usable value (not `0` and not blank)
    pub fn is_present(&self) -> bool {
        match self {
            Self::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for TransactionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A single transaction as returned by a scraper
///
/// `date` stays the raw ISO string the scraper produced; it is only parsed
/// when identity keys are computed, so a malformed date fails that single
/// transaction rather than the whole scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "type", default)]
    pub kind: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<TransactionIdentifier>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub processed_date: Option<String>,
    pub original_amount: Decimal,
    pub original_currency: String,
    #[serde(default)]
    pub charged_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charged_currency: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installments: Option<InstallmentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Bank-specific payload, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_transaction: Option<JsonValue>,
}

impl Transaction {
    /// Create a completed, normal transaction charged in the original currency
    pub fn new(date: impl Into<String>, amount: Decimal, description: impl Into<String>) -> Self {
        let date = date.into();
        Self {
            kind: TransactionType::Normal,
            identifier: None,
            processed_date: Some(date.clone()),
            date: Some(date),
            original_amount: amount,
            original_currency: "ILS".to_string(),
            charged_amount: Some(amount),
            charged_currency: None,
            description: description.into(),
            memo: None,
            status: TransactionStatus::Completed,
            installments: None,
            category: None,
            raw_transaction: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// The amount that best represents the transaction for display
    ///
    /// Pending normal transactions have no reliable charged amount yet, so the
    /// original amount is used for them.
    pub fn display_amount(&self) -> Decimal {
        match (self.kind, self.status) {
            (TransactionType::Normal, TransactionStatus::Pending) => self.original_amount,
            _ => self.charged_amount.unwrap_or(self.original_amount),
        }
    }
}

/// A transaction tagged with its origin and identity keys
///
/// Created exactly once per scraped transaction and never mutated afterwards;
/// this is the unit every destination receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRow {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub account: String,
    pub company_id: CompanyId,
    pub hash: String,
    pub unique_id: String,
}

impl std::ops::Deref for TransactionRow {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}
