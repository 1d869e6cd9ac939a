//! Trading Guard - Entry Point
//!
//! `controller` and `enforcer` run as separate processes and converge
//! through the session document; `status` prints it.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use guard_bot::{
    paper_console, render_status, AppConfig, Controller, Enforcer, PaperCommand, ScheduledNews,
    TerminalProcess,
};
use guard_bridge::{FileSessionStore, SessionStore};
use guard_executor::PaperVenue;
use guard_persistence::JsonLinesJournal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Trading discipline guard
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via GUARD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the controller; operator commands are read from stdin
    Controller,
    /// Run the enforcer against the paper venue
    Enforcer {
        /// Read paper venue commands (open, pnl, close, positions) from stdin
        #[arg(long)]
        paper_console: bool,
    },
    /// Print the session document
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    guard_telemetry::init_logging()?;

    info!("Starting Trading Guard v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");
    let config = AppConfig::from_file(&config_path)?;
    info!(store = %config.store.path.display(), "Configuration loaded");

    let store = FileSessionStore::new(config.store.clone());
    let news = ScheduledNews::new(config.news.events.clone(), config.news.buffer_minutes);

    match args.command {
        Command::Controller => {
            let terminal = TerminalProcess::from_config(&config.terminal);
            if terminal.is_none() {
                warn!("No terminal executable configured; terminal lifecycle not managed");
            }
            let mut controller = Controller::new(&config, store, terminal, news, Utc::now())?;
            controller.run().await?;
        }
        Command::Enforcer { paper_console } => {
            let venue = Arc::new(PaperVenue::new());
            if paper_console {
                spawn_paper_console(venue.clone());
            }
            let journal = JsonLinesJournal::new(&config.enforcer.journal_dir);
            let mut enforcer = Enforcer::new(&config, store, venue, journal, news, Utc::now());
            enforcer.run().await?;
        }
        Command::Status => {
            let state = store.load()?;
            println!("{}", render_status(&state, Utc::now())?);
        }
    }

    Ok(())
}

fn spawn_paper_console(venue: Arc<PaperVenue>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match line.parse::<PaperCommand>() {
                Ok(command) => paper_console::apply(&venue, command, Utc::now()).await,
                Err(e) => Err(e),
            };
            match reply {
                Ok(reply) => println!("{reply}"),
                Err(e) => println!("error: {e}"),
            }
        }
        info!("Paper console closed");
    });
}
