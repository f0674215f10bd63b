//! CLI command implementations

pub mod firewall;
pub mod identity;
pub mod run;
pub mod scrape;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bankfeed_core::adapters::demo::{DemoScraper, NoopBrowser};
use bankfeed_core::ports::{BrowserProvider, Scraper};
use bankfeed_core::BankfeedContext;
use tracing::info;

use crate::output;

/// Get the bankfeed directory from environment or default
pub fn get_bankfeed_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("BANKFEED_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".bankfeed"))
        .context("Could not find home directory, set BANKFEED_DIR")
}

/// Load the config and build the context, warning about broken destinations
pub fn get_context() -> Result<BankfeedContext> {
    let dir = get_bankfeed_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create bankfeed directory: {}", dir.display()))?;

    let ctx = BankfeedContext::new(&dir).context("Failed to initialize bankfeed context")?;
    info!(
        dir = %dir.display(),
        accounts = ctx.config.accounts.len(),
        destinations = ctx.storages.len(),
        "Loaded config"
    );
    for (name, error) in &ctx.storage_failures {
        output::warning(&format!("Destination {} disabled: {}", name, error));
    }
    Ok(ctx)
}

/// Scraper and browser the CLI drives
///
/// Site automation is an external engine; the CLI ships with the demo one.
pub fn scrape_engine() -> (Arc<dyn Scraper>, Arc<dyn BrowserProvider>) {
    (Arc::new(DemoScraper::new()), Arc::new(NoopBrowser))
}
