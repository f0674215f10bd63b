//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! and pure functions - no I/O or external dependencies.

mod account;
pub mod identity;
pub mod result;
mod rule;
mod save_stats;
mod scrape;
mod transaction;

pub use account::{AccountConfig, CompanyId};
pub use identity::{
    tag_transaction, transaction_hash, transaction_unique_id, DEFAULT_TIMEZONE,
};
pub use rule::{DomainRule, RuleAction};
pub use save_stats::SaveStats;
pub use scrape::{AccountScrapeResult, ScrapeErrorKind, ScrapeResult, ScrapedAccount};
pub use transaction::{
    InstallmentInfo, Transaction, TransactionIdentifier, TransactionRow, TransactionStatus,
    TransactionType,
};
