//! Transaction identity keys
//!
//! Two deduplication keys are computed for every scraped transaction:
//!
//! - [`transaction_hash`]: the legacy key, kept byte-compatible with the hash
//!   older deployments stored. It ignores the bank identifier, so two
//!   transactions that differ only by identifier share a hash.
//! - [`transaction_unique_id`]: the robust key; it includes the identifier
//!   and, for Mizrahi, the bank's per-day sequence number.
//!
//! Both are pure functions of the transaction, the company, the account
//! number and the timezone. The timezone decides the calendar date of the
//! unique id and how dates without an offset are read. Missing optional
//! fields render as empty strings.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::account::CompanyId;
use super::result::{Error, Result};
use super::transaction::{Transaction, TransactionRow};

/// Company whose scraper emits repeated identifiers within one batch
const MIZRAHI: &str = "mizrahi";
/// Raw payload field holding Mizrahi's per-day sequence number
const MIZRAHI_SEQUENCE_FIELD: &str = "TransactionNumber";
/// Sequence value Mizrahi uses when there is only one transaction
const MIZRAHI_DEFAULT_SEQUENCE: &str = "1";

const MINUTE_MS: i64 = 60_000;

/// Timezone the banks report in
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Jerusalem;

/// Legacy, collision-prone transaction hash
///
/// `<date rounded to minute>_<chargedAmount>_<description>_<memo>_<company>_<account>`
pub fn transaction_hash(
    tx: &Transaction,
    company_id: &CompanyId,
    account_number: &str,
    tz: Tz,
) -> Result<String> {
    let date = round_to_nearest_minute(parse_date(tx.date.as_deref(), tz)?)?;
    let parts = [
        date.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        format_amount(tx.charged_amount),
        tx.description.clone(),
        tx.memo.clone().unwrap_or_default(),
        company_id.to_string(),
        account_number.to_string(),
    ];
    Ok(parts.join("_"))
}

/// Unique id used by destinations for deduplication
///
/// `<date>_<company>_<account>_<chargedAmount>_<identifier or description_memo>`,
/// where `<date>` is the calendar date in `tz`
pub fn transaction_unique_id(
    tx: &Transaction,
    company_id: &CompanyId,
    account_number: &str,
    tz: Tz,
) -> Result<String> {
    let date = parse_date(tx.date.as_deref(), tz)?.with_timezone(&tz);

    let discriminator = match &tx.identifier {
        Some(identifier) if identifier.is_present() => identifier.to_string(),
        _ => format!("{}_{}", tx.description, tx.memo.as_deref().unwrap_or_default()),
    };

    let mut parts = vec![
        date.date_naive().format("%Y-%m-%d").to_string(),
        company_id.to_string(),
        account_number.to_string(),
        format_amount(tx.charged_amount),
        discriminator,
    ];

    if company_id.as_str() == MIZRAHI {
        if let Some(sequence) = mizrahi_sequence(tx.raw_transaction.as_ref()) {
            debug!(
                amount = %format_amount(tx.charged_amount),
                sequence = %sequence,
                "Using sequence differentiator for mizrahi transaction"
            );
            parts.push(sequence);
        }
    }

    Ok(parts
        .iter()
        .map(|p| p.trim())
        .collect::<Vec<_>>()
        .join("_"))
}

/// Tag a scraped transaction with its origin and both identity keys
pub fn tag_transaction(
    tx: &Transaction,
    company_id: &CompanyId,
    account_number: &str,
    tz: Tz,
) -> Result<TransactionRow> {
    Ok(TransactionRow {
        hash: transaction_hash(tx, company_id, account_number, tz)?,
        unique_id: transaction_unique_id(tx, company_id, account_number, tz)?,
        transaction: tx.clone(),
        account: account_number.to_string(),
        company_id: company_id.clone(),
    })
}

/// Parse a scraper date: RFC 3339, offset-less date-time or bare date
///
/// Dates without an offset are local time in `tz`; a bare date is midnight.
pub fn parse_date(date: Option<&str>, tz: Tz) -> Result<DateTime<FixedOffset>> {
    let raw = date
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::invalid_date("date is missing"))?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(local_to_fixed(naive, tz));
    }
    if let Some(naive) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(local_to_fixed(naive, tz));
    }

    Err(Error::invalid_date(format!("cannot parse {:?}", raw)))
}

/// Wall-clock time in `tz`; times skipped by a DST jump are read as UTC
fn local_to_fixed(naive: NaiveDateTime, tz: Tz) -> DateTime<FixedOffset> {
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .fixed_offset()
}

fn round_to_nearest_minute(date: DateTime<FixedOffset>) -> Result<DateTime<Utc>> {
    let millis = date.timestamp_millis();
    let remainder = millis.rem_euclid(MINUTE_MS);
    let floor = millis - remainder;
    let rounded = if remainder >= MINUTE_MS / 2 {
        floor + MINUTE_MS
    } else {
        floor
    };
    DateTime::from_timestamp_millis(rounded)
        .ok_or_else(|| Error::invalid_date(format!("{} is out of range", date)))
}

/// Shortest decimal rendering: `-12.5`, `100`; missing amounts render empty
fn format_amount(amount: Option<Decimal>) -> String {
    amount
        .map(|a| a.normalize().to_string())
        .unwrap_or_default()
}

fn mizrahi_sequence(raw: Option<&JsonValue>) -> Option<String> {
    match raw?.get(MIZRAHI_SEQUENCE_FIELD)? {
        JsonValue::String(s) if s.is_empty() || s == MIZRAHI_DEFAULT_SEQUENCE => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) if n.as_f64() == Some(0.0) => None,
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}
