//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions: the domain
//! firewall, the scrape scheduler, the save fan-out and the run that ties
//! them together.

pub mod firewall;
pub mod messages;
pub mod notifier;
pub mod run;
pub mod save;
pub mod scrape;

pub use firewall::{CompanyDomains, DomainGuard, DomainRuleEngine, DomainTracker};
pub use notifier::Notifier;
pub use run::{scrape_settings, RunContext, RunPhase, RunPipeline, RunReport, ScrapeReport};
pub use save::{rows_from_results, DestinationOutcome, SaveCoordinator, SaveReport, StepTimer};
pub use scrape::{
    LogObserver, NotifierObserver, RetryPolicy, ScrapeObserver, ScrapeScheduler, ScrapeSettings,
};
