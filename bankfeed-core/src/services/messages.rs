//! Message rendering for the progress surface
//!
//! Plain-text renderings of scrape summaries and per-destination save
//! outcomes. Kept free of I/O so they can be unit tested directly.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::{AccountScrapeResult, SaveStats, ScrapeResult, Transaction, TransactionRow};
use super::save::StepTimer;

/// Currency the summary treats as local
const LOCAL_CURRENCY: &str = "ILS";

/// Map currency symbols to ISO codes and uppercase the result
pub fn normalize_currency(currency: Option<&str>) -> Option<String> {
    let currency = currency.filter(|c| !c.is_empty())?;
    let code = match currency {
        "$" => "USD",
        "€" => "EUR",
        "₪" => "ILS",
        other => other,
    };
    Some(code.to_uppercase())
}

fn is_foreign(currency: Option<&str>) -> bool {
    normalize_currency(currency).is_some_and(|c| c != LOCAL_CURRENCY)
}

/// `description:\t-12.50 USD`
fn transaction_line(tx: &Transaction) -> String {
    let amount = tx.display_amount();
    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        "+"
    };
    let currency = if is_foreign(Some(&tx.original_currency)) {
        format!(" {}", tx.original_currency)
    } else {
        String::new()
    };
    format!("{}:\t{}{:.2}{}", tx.description, sign, amount.abs(), currency)
}

/// One indented line per transaction
pub fn transaction_list<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    indent: &str,
) -> String {
    transactions
        .into_iter()
        .map(|tx| format!("{}{}", indent, transaction_line(tx)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary posted after scraping finishes
pub fn scrape_summary(results: &[AccountScrapeResult]) -> String {
    let transactions: Vec<&Transaction> = results
        .iter()
        .flat_map(|r| r.result.accounts())
        .flat_map(|a| a.txns.iter())
        .collect();
    let (pending, completed): (Vec<&Transaction>, Vec<&Transaction>) =
        transactions.into_iter().partition(|tx| tx.is_pending());

    let accounts: Vec<String> = results
        .iter()
        .flat_map(|r| match &r.result {
            ScrapeResult::Success { accounts } => accounts
                .iter()
                .map(|a| format!("\t✔️ [{}] {}: {}", r.company_id, a.account_number, a.txns.len()))
                .collect::<Vec<_>>(),
            ScrapeResult::Failure { error_kind, message } => {
                let detail = message
                    .as_deref()
                    .map(|m| format!("\n\t\t{}", m))
                    .unwrap_or_default();
                vec![format!("\t❌ [{}] {}{}", r.company_id, error_kind, detail)]
            }
        })
        .collect();

    let accounts = if accounts.is_empty() {
        "\t😶 None".to_string()
    } else {
        accounts.join("\n")
    };
    let pending_list = if pending.is_empty() {
        "\t😶 None".to_string()
    } else {
        transaction_list(pending.iter().copied(), "\t")
    };

    format!(
        "{}\n\nAccounts updated:\n{}\n\nPending txns:\n{}",
        totals_line(&pending, &completed),
        accounts,
        pending_list
    )
}

fn totals_line(pending: &[&Transaction], completed: &[&Transaction]) -> String {
    let total = pending.len() + completed.len();
    let mut lines = vec![format!("{} transactions scraped.", total)];
    if total > 0 {
        lines.push(format!(
            "({} pending, {} completed)",
            pending.len(),
            completed.len()
        ));
    }

    let original = completed
        .iter()
        .filter(|tx| is_foreign(Some(&tx.original_currency)))
        .count();
    if original > 0 {
        let charged = completed
            .iter()
            .filter(|tx| is_foreign(tx.charged_currency.as_deref()))
            .count();
        let charged = if charged > 0 {
            format!(" and {} not charged in {}", charged, LOCAL_CURRENCY)
        } else {
            String::new()
        };
        lines.push(format!(
            "From completed, {} not originally in {}{}",
            original, LOCAL_CURRENCY, charged
        ));
    }
    lines.join("\n")
}

fn steps_block(steps: &[StepTimer]) -> String {
    steps
        .iter()
        .map(|s| format!("\t{}", s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Progress text while a destination is saving
pub fn saving_message(name: &str, steps: &[StepTimer]) -> String {
    format!("📝 {} Saving...\n{}", name, steps_block(steps))
        .trim()
        .to_string()
}

/// Final text for a destination that saved successfully
pub fn stats_message(stats: &SaveStats, duration: Duration, steps: &[StepTimer]) -> String {
    let mut out = format!("📝 {}", stats.name);
    if let Some(table) = &stats.table {
        out.push_str(&format!(" ({})", table));
    }
    if !steps.is_empty() {
        out.push('\n');
        out.push_str(&steps_block(steps));
    }
    out.push_str(&format!("\n\t{} added", stats.added));
    let skipped = stats.skipped_summary();
    if !skipped.is_empty() {
        out.push_str(&format!("\n\t{}", skipped));
    }
    out.push_str(&format!("\n\ttook {:.2}s", duration.as_secs_f64()));

    let highlighted = highlighted_groups(&stats.highlighted, 1);
    if !highlighted.is_empty() {
        out.push('\n');
        out.push_str(&highlighted);
    }
    out
}

/// Render named groups of rows, skipping empty groups
pub fn highlighted_groups(groups: &BTreeMap<String, Vec<TransactionRow>>, indent: usize) -> String {
    let indent = "\t".repeat(indent);
    let rendered: Vec<String> = groups
        .iter()
        .filter(|(_, rows)| !rows.is_empty())
        .map(|(name, rows)| {
            let list = transaction_list(rows.iter().map(|r| &r.transaction), &format!("{}\t", indent));
            format!("{}{}:\n{}", indent, name, list)
        })
        .collect();

    if rendered.is_empty() {
        return String::new();
    }
    format!("{}-----\n{}", indent, rendered.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompanyId, ScrapeErrorKind, ScrapedAccount, TransactionStatus};
    use rust_decimal::Decimal;

    fn tx(description: &str, amount: i64, status: TransactionStatus) -> Transaction {
        let mut tx = Transaction::new("2024-01-01T00:00:00.000Z", Decimal::new(amount, 2), description);
        tx.status = status;
        tx
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency(Some("₪")), Some("ILS".to_string()));
        assert_eq!(normalize_currency(Some("usd")), Some("USD".to_string()));
        assert_eq!(normalize_currency(Some("")), None);
        assert_eq!(normalize_currency(None), None);
    }

    #[test]
    fn test_transaction_list() {
        let mut foreign = tx("Hotel", -10000, TransactionStatus::Completed);
        foreign.original_currency = "EUR".to_string();
        let list = transaction_list(
            [&tx("Salary", 500000, TransactionStatus::Completed), &foreign],
            "\t",
        );
        assert_eq!(list, "\tSalary:\t+5000.00\n\tHotel:\t-100.00 EUR");
    }

    #[test]
    fn test_scrape_summary() {
        let results = vec![
            AccountScrapeResult {
                company_id: CompanyId::new("max"),
                result: ScrapeResult::Success {
                    accounts: vec![ScrapedAccount {
                        account_number: "1234".to_string(),
                        txns: vec![
                            tx("Coffee", -1500, TransactionStatus::Pending),
                            tx("Rent", -400000, TransactionStatus::Completed),
                        ],
                    }],
                },
                attempts: 1,
            },
            AccountScrapeResult {
                company_id: CompanyId::new("leumi"),
                result: ScrapeResult::failure(ScrapeErrorKind::InvalidPassword, "wrong password"),
                attempts: 1,
            },
        ];

        let summary = scrape_summary(&results);
        assert!(summary.starts_with("2 transactions scraped.\n(1 pending, 1 completed)"));
        assert!(summary.contains("\t✔️ [max] 1234: 2"));
        assert!(summary.contains("\t❌ [leumi] INVALID_PASSWORD\n\t\twrong password"));
        assert!(summary.contains("Pending txns:\n\tCoffee:\t-15.00"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = scrape_summary(&[]);
        assert_eq!(
            summary,
            "0 transactions scraped.\n\nAccounts updated:\n\t😶 None\n\nPending txns:\n\t😶 None"
        );
    }

    #[test]
    fn test_stats_message() {
        let mut stats = SaveStats {
            name: "DuckDB".to_string(),
            table: Some("transactions".to_string()),
            total: 5,
            added: 3,
            existing: 2,
            ..Default::default()
        };
        let message = stats_message(&stats, Duration::from_millis(1500), &[]);
        assert_eq!(
            message,
            "📝 DuckDB (transactions)\n\t3 added\n\t2 skipped (2 existing)\n\ttook 1.50s"
        );

        stats.existing = 0;
        let message = stats_message(&stats, Duration::from_millis(20), &[]);
        assert!(!message.contains("skipped"));
    }

    #[test]
    fn test_saving_message_without_steps() {
        assert_eq!(saving_message("Json", &[]), "📝 Json Saving...");
    }
}
