//! Bankfeed CLI - scrape bank accounts and save the transactions

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{firewall, identity, run, scrape};

/// Bankfeed - bank transactions, scraped and fanned out to your storage
#[derive(Parser)]
#[command(name = "bf", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every configured account and save to all destinations
    Run {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scrape every configured account without saving
    Scrape {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect the domain firewall rules
    Firewall {
        #[command(subcommand)]
        command: firewall::FirewallCommands,
    },

    /// Print the dedup keys of the transactions in a JSON file
    Identity {
        /// JSON file holding an array of transactions
        file: PathBuf,
        /// Company the transactions were scraped from
        #[arg(long)]
        company: String,
        /// Account number the transactions belong to
        #[arg(long)]
        account: String,
        /// Timezone the transaction dates are read in
        #[arg(long, env = "TZ", default_value = "Asia/Jerusalem")]
        timezone: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bankfeed=info,bf=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { json } => run::run(json).await,
        Commands::Scrape { json } => scrape::run(json).await,
        Commands::Firewall { command } => firewall::run(command),
        Commands::Identity {
            file,
            company,
            account,
            timezone,
            json,
        } => identity::run(&file, &company, &account, &timezone, json),
    }
}
