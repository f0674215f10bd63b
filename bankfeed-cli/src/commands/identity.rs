//! Identity command - compute dedup keys for transactions in a file

use std::path::Path;

use anyhow::{Context, Result};
use bankfeed_core::config::parse_timezone;
use bankfeed_core::domain::{tag_transaction, CompanyId, Transaction};
use colored::Colorize;
use serde::Serialize;

use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRow {
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(file: &Path, company: &str, account: &str, timezone: &str, json: bool) -> Result<()> {
    let tz = parse_timezone(timezone)?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let transactions: Vec<Transaction> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of transactions", file.display()))?;
    let company = CompanyId::new(company);

    let rows: Vec<IdentityRow> = transactions
        .iter()
        .map(|tx| {
            match tag_transaction(tx, &company, account, tz) {
                Ok(row) => IdentityRow {
                    description: tx.description.clone(),
                    hash: Some(row.hash),
                    unique_id: Some(row.unique_id),
                    error: None,
                },
                Err(e) => IdentityRow {
                    description: tx.description.clone(),
                    hash: None,
                    unique_id: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Description", "Hash", "Unique ID"]);
    for row in &rows {
        match &row.error {
            Some(error) => table.add_row(vec![
                row.description.clone(),
                error.red().to_string(),
                String::new(),
            ]),
            None => table.add_row(vec![
                row.description.clone(),
                row.hash.clone().unwrap_or_default(),
                row.unique_id.clone().unwrap_or_default(),
            ]),
        };
    }
    println!("{}", table);
    Ok(())
}
