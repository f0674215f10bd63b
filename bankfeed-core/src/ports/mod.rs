//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external collaborators: the site
//! automation engine, browser provisioning, storage destinations and the
//! progress surface. The core depends only on these traits.

mod browser;
mod notifier;
mod scraper;
mod storage;

pub use browser::{BrowserContext, BrowserProvider, BrowserSession, RequestFilter};
pub use notifier::{MessageChannel, MessageHandle};
pub use scraper::{ProgressListener, ScrapeOptions, Scraper};
pub use storage::{SaveProgress, TransactionStorage};
