//! Configuration management
//!
//! Settings live in `settings.json` inside the bankfeed directory:
//! ```json
//! {
//!   "scraping": { "daysBack": 10, "parallelScrapers": 2, "timezone": "Asia/Jerusalem" },
//!   "security": { "firewallSettings": "max BLOCK tracker.io", "blockByDefault": false },
//!   "storage": { "localJson": { "enabled": true } },
//!   "notifications": { "telegram": { "apiKey": "...", "chatId": "..." } },
//!   "accounts": [ { "companyId": "max", "username": "...", "password": "..." } ]
//! }
//! ```
//!
//! Environment variables override the file (see [`Config::apply_env`]).

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::result::Error;
use crate::domain::{AccountConfig, DEFAULT_TIMEZONE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapingSettings {
    /// How many days back to start scraping from
    pub days_back: i64,
    pub future_months: Option<u32>,
    pub parallel_scrapers: usize,
    /// Record every domain each scrape touched
    pub domain_tracking: bool,
    /// Attempts per account, including the first
    pub max_attempts: u32,
    pub additional_transaction_information: bool,
    /// IANA timezone the banks report in; decides transaction calendar dates
    pub timezone: String,
}

impl ScrapingSettings {
    pub fn tz(&self) -> crate::domain::result::Result<Tz> {
        parse_timezone(&self.timezone)
    }
}

/// Parse an IANA timezone name such as `Asia/Jerusalem`
pub fn parse_timezone(name: &str) -> crate::domain::result::Result<Tz> {
    name.trim()
        .parse()
        .map_err(|e| Error::Config(format!("Unknown timezone {:?}: {}", name, e)))
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            days_back: 10,
            future_months: None,
            parallel_scrapers: 1,
            domain_tracking: false,
            max_attempts: 2,
            additional_transaction_information: true,
            timezone: DEFAULT_TIMEZONE.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    /// Domain rules text, one `<company> <ALLOW|BLOCK> <domain>` per line or `|`-joined
    pub firewall_settings: String,
    pub block_by_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalJsonSettings {
    pub enabled: bool,
    /// Output directory; defaults to `<bankfeed dir>/output`
    pub path: Option<PathBuf>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebPostSettings {
    pub url: Option<String>,
    pub authorization_token: Option<String>,
    /// Send the unique id instead of the legacy hash in the `hash` column
    pub use_unique_id: bool,
}

impl fmt::Debug for WebPostSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebPostSettings")
            .field("url", &self.url)
            .field("authorization_token", &self.authorization_token.as_ref().map(|_| "***"))
            .field("use_unique_id", &self.use_unique_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuckDbSettings {
    /// Database file; relative paths resolve against the bankfeed directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub local_json: LocalJsonSettings,
    pub web_post: WebPostSettings,
    pub duckdb: DuckDbSettings,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramSettings {
    pub api_key: Option<String>,
    pub chat_id: Option<String>,
}

impl TelegramSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.chat_id.as_deref().is_some_and(|c| !c.is_empty())
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub telegram: TelegramSettings,
}

/// Bankfeed configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub scraping: ScrapingSettings,
    pub security: SecuritySettings,
    pub storage: StorageSettings,
    pub notifications: NotificationSettings,
    pub accounts: Vec<AccountConfig>,
    /// Directory the config was loaded from
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Config {
    /// Load config from the bankfeed directory, then apply environment overrides
    pub fn load(dir: &Path) -> Result<Self> {
        let settings_path = dir.join("settings.json");

        let mut config: Config = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            Config::default()
        };
        config.dir = dir.to_path_buf();

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from environment-style variables
    ///
    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(accounts) = lookup("BANKFEED_ACCOUNTS") {
            self.accounts = serde_json::from_str(&accounts)
                .context("BANKFEED_ACCOUNTS must be a JSON array of accounts")?;
        }
        if let Some(rules) = lookup("FIREWALL_SETTINGS") {
            self.security.firewall_settings = rules;
        }
        if let Some(flag) = lookup("BLOCK_BY_DEFAULT") {
            self.security.block_by_default = parse_flag(&flag);
        }
        if let Some(parallel) = lookup("PARALLEL_SCRAPERS") {
            self.scraping.parallel_scrapers = parallel
                .trim()
                .parse()
                .with_context(|| format!("PARALLEL_SCRAPERS is not a number: {}", parallel))?;
        }
        if let Some(days) = lookup("DAYS_BACK") {
            self.scraping.days_back = days
                .trim()
                .parse()
                .with_context(|| format!("DAYS_BACK is not a number: {}", days))?;
        }
        if let Some(tz) = lookup("TZ").filter(|tz| !tz.trim().is_empty()) {
            self.scraping.timezone = tz;
        }
        if let Some(url) = lookup("WEB_POST_URL") {
            self.storage.web_post.url = Some(url);
        }
        if let Some(token) = lookup("WEB_POST_AUTHORIZATION_TOKEN") {
            self.storage.web_post.authorization_token = Some(token);
        }
        if let Some(key) = lookup("TELEGRAM_API_KEY") {
            self.notifications.telegram.api_key = Some(key);
        }
        if let Some(chat) = lookup("TELEGRAM_CHAT_ID") {
            self.notifications.telegram.chat_id = Some(chat);
        }
        Ok(())
    }

    /// Resolve a configured path against the bankfeed directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}
