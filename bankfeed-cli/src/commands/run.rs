//! Run command - scrape, tag and save to every destination

use anyhow::Result;
use bankfeed_core::services::DestinationOutcome;
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
    let pipeline = ctx.pipeline(scraper, browser)?;
    if pipeline.destinations().is_empty() {
        output::warning("No destinations configured, scraped transactions will not be saved.");
    }
    let report = pipeline.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    super::scrape::print_results(&report.results);
    println!();
    println!("{} {}", "Transactions tagged:".bold(), report.rows);
    println!();

    if report.save.is_empty() {
        output::warning("Nothing was saved.");
    }
    for (name, outcome) in &report.save.destinations {
        match outcome {
            DestinationOutcome::Saved {
                stats,
                duration,
                steps,
            } => {
                println!("{} {}", "Saved:".green(), name);
                if let Some(table) = &stats.table {
                    println!("  Target: {}", table);
                }
                println!("  Added: {}", stats.added);
                let skipped = stats.skipped_summary();
                if !skipped.is_empty() {
                    println!("  {}", skipped);
                }
                for step in steps {
                    println!("  {}", step.dimmed());
                }
                println!("  Took {}", output::format_duration(*duration));
            }
            DestinationOutcome::Failed { error } => {
                println!("{} {} - {}", "Failed:".red(), name, error);
            }
        }
        println!();
    }

    if let Some(domains) = &report.used_domains {
        println!("{}", "Used domains".bold());
        println!("{}", serde_json::to_string_pretty(domains)?);
    }

    let failed = report.save.failures().len();
    if failed > 0 {
        output::error(&format!("{} destination(s) failed", failed));
    } else if !report.save.is_empty() {
        output::success("Run complete");
    }
    Ok(())
}
