//! Browser provisioning port
//!
//! A run opens one browser session and carves one isolated context out of it
//! per scrape attempt. Every context is handed a [`RequestFilter`] that the
//! implementation must consult for each outgoing request.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::CompanyId;

/// Per-request access decision hook, scoped to one company
pub trait RequestFilter: Send + Sync {
    /// Whether requests need to be intercepted at all
    ///
    /// Implementations may skip request interception entirely when this is
    /// false, since no request would ever be blocked.
    fn intercepts(&self) -> bool;

    /// Decide whether a request must be aborted
    fn is_blocked(&self, method: &str, url: &str) -> bool;

    /// Record a top-level navigation
    fn page_navigated(&self, url: &str);
}

/// Creates browser sessions
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn create_session(&self) -> Result<Arc<dyn BrowserSession>>;
}

/// One running browser shared by all scrape tasks of a run
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Create an isolated context wired to `filter`
    async fn create_context(
        &self,
        company_id: &CompanyId,
        filter: Arc<dyn RequestFilter>,
    ) -> Result<Box<dyn BrowserContext>>;

    /// Tear the session down
    async fn close(&self) -> Result<()>;
}

/// An isolated browsing context handed to a scraper
pub trait BrowserContext: Send + Sync {
    fn company_id(&self) -> &CompanyId;

    /// Filter installed on this context
    fn filter(&self) -> &Arc<dyn RequestFilter>;
}
