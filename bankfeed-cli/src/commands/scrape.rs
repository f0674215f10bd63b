//! Scrape command - scrape all accounts and show what was found

use anyhow::Result;
use bankfeed_core::domain::{AccountScrapeResult, ScrapeResult};
use colored::Colorize;

use super::{get_context, scrape_engine};
use crate::output;

pub async fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    if ctx.config.accounts.is_empty() {
        output::warning("No accounts configured. Add some to settings.json or BANKFEED_ACCOUNTS.");
        return Ok(());
    }

    let (scraper, browser) = scrape_engine();
    let report = ctx.pipeline(scraper, browser)?.scrape().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_results(&report.results);
    Ok(())
}

/// One row per scraped bank account, or per failed company login
pub fn print_results(results: &[AccountScrapeResult]) {
    let mut table = output::create_table();
    table.set_header(vec!["Company", "Account", "Result", "Attempts"]);

    for result in results {
        match &result.result {
            ScrapeResult::Success { accounts } if accounts.is_empty() => {
                table.add_row(vec![
                    result.company_id.to_string(),
                    "-".to_string(),
                    "no accounts".to_string(),
                    result.attempts.to_string(),
                ]);
            }
            ScrapeResult::Success { accounts } => {
                for account in accounts {
                    table.add_row(vec![
                        result.company_id.to_string(),
                        account.account_number.clone(),
                        format!("{} transactions", account.txns.len()),
                        result.attempts.to_string(),
                    ]);
                }
            }
            ScrapeResult::Failure { error_kind, message } => {
                let detail = match message {
                    Some(message) => format!("{}: {}", error_kind, message),
                    None => error_kind.to_string(),
                };
                table.add_row(vec![
                    result.company_id.to_string(),
                    "-".to_string(),
                    detail.red().to_string(),
                    result.attempts.to_string(),
                ]);
            }
        }
    }

    println!("{}", "Scrape Results".bold());
    println!("{}", table);
}
