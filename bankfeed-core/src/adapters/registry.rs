//! Static destination registry
//!
//! Each entry pairs a "is this destination configured" predicate with a
//! factory. The active destination set is built once, at startup.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::ports::{MessageChannel, TransactionStorage};
use super::duckdb::DuckDbStorage;
use super::json::LocalJsonStorage;
use super::telegram::{LogChannel, TelegramChannel};
use super::web_post::WebPostStorage;

pub struct StorageRegistration {
    pub name: &'static str,
    pub is_configured: fn(&Config) -> bool,
    pub build: fn(&Config) -> Result<Arc<dyn TransactionStorage>>,
}

pub static STORAGES: &[StorageRegistration] = &[
    StorageRegistration {
        name: "LocalJson",
        is_configured: |config| config.storage.local_json.enabled,
        build: |config| {
            let folder = config
                .storage
                .local_json
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from("output"));
            Ok(Arc::new(LocalJsonStorage::new(config.resolve(&folder), true)))
        },
    },
    StorageRegistration {
        name: "WebPost",
        is_configured: |config| {
            config
                .storage
                .web_post
                .url
                .as_deref()
                .is_some_and(|url| !url.is_empty())
        },
        build: |config| {
            let storage = WebPostStorage::new(&config.storage.web_post, config.scraping.tz()?)?;
            Ok(Arc::new(storage))
        },
    },
    StorageRegistration {
        name: "DuckDB",
        is_configured: |config| config.storage.duckdb.path.is_some(),
        build: |config| {
            let path = config
                .storage
                .duckdb
                .path
                .as_deref()
                .ok_or_else(|| Error::Config("storage.duckdb.path is not set".to_string()))?;
            Ok(Arc::new(DuckDbStorage::open(&config.resolve(path))?))
        },
    },
];

/// Destinations built from the config, plus the ones that failed to build
#[derive(Default)]
pub struct ActiveStorages {
    pub storages: Vec<Arc<dyn TransactionStorage>>,
    pub failed: Vec<(&'static str, Error)>,
}

/// Build every configured destination
///
/// A destination that fails to build is reported and left out; the others
/// are still returned.
pub fn build_storages(config: &Config) -> ActiveStorages {
    build_from(STORAGES, config)
}

fn build_from(registry: &[StorageRegistration], config: &Config) -> ActiveStorages {
    let mut active = ActiveStorages::default();
    for registration in registry.iter().filter(|r| (r.is_configured)(config)) {
        match (registration.build)(config) {
            Ok(storage) => {
                info!(destination = registration.name, "Destination enabled");
                active.storages.push(storage);
            }
            Err(e) => {
                warn!(destination = registration.name, error = %e, "Failed to set up destination");
                active.failed.push((registration.name, e));
            }
        }
    }
    active
}

/// The progress channel: Telegram when configured, otherwise the log
pub fn build_channel(config: &Config) -> Result<Arc<dyn MessageChannel>> {
    let telegram = &config.notifications.telegram;
    if telegram.is_configured() {
        Ok(Arc::new(TelegramChannel::new(telegram)?))
    } else {
        Ok(Arc::new(LogChannel::new()))
    }
}
