//! Firewall command - inspect the configured domain rules

use anyhow::Result;
use bankfeed_core::config::Config;
use bankfeed_core::domain::{CompanyId, RuleAction};
use bankfeed_core::services::DomainRuleEngine;
use clap::Subcommand;
use colored::Colorize;

use super::get_bankfeed_dir;
use crate::output;

#[derive(Subcommand)]
pub enum FirewallCommands {
    /// Show whether a URL is allowed for a company
    Check {
        /// URL the scraper would request
        url: String,
        /// Company scraping it
        company: String,
    },
    /// List the parsed rules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: FirewallCommands) -> Result<()> {
    // Only the rules are needed, so skip building destinations
    let config = Config::load(&get_bankfeed_dir()?)?;
    let engine = DomainRuleEngine::load(
        &config.security.firewall_settings,
        config.security.block_by_default,
    );

    match command {
        FirewallCommands::Check { url, company } => {
            let company = CompanyId::new(company);
            let action = engine.get_rule(&url, &company);
            let label = match action {
                RuleAction::Allow => action.to_string().green(),
                RuleAction::Block => action.to_string().red(),
            };
            println!("{} {} for {}", label, url, company);
            if !engine.has_any_rule(&company) {
                println!(
                    "  No rules for {}, default is {}",
                    company,
                    engine.default_action()
                );
            }
        }
        FirewallCommands::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(engine.rules())?);
                return Ok(());
            }
            if engine.rules().is_empty() {
                output::warning("No firewall rules configured.");
            } else {
                let mut table = output::create_table();
                table.set_header(vec!["Company", "Action", "Domain"]);
                for rule in engine.rules() {
                    table.add_row(vec![
                        rule.company_id.to_string(),
                        rule.action.to_string(),
                        rule.domain.clone(),
                    ]);
                }
                println!("{}", table);
            }
            println!("Default action: {}", engine.default_action());
        }
    }
    Ok(())
}
