//! `agenda` CLI: normalize iCalendar feeds and pick the next meeting.
//!
//! ## Usage
//!
//! ```sh
//! # Normalized events of a feed as JSON (stdin → stdout)
//! curl -s https://example.com/team.ics | agenda events
//!
//! # Concatenate two feeds and evaluate at a fixed instant
//! agenda events -i work.ics -i home.ics --now 2024-05-14T12:00:00Z
//!
//! # Pick the next meeting, hiding one occurrence
//! agenda select -i team.ics --hide 'standup@example.com@20240514T130000Z'
//!
//! # Re-read the configured feeds every `refresh_interval_secs`
//! agenda watch --config agenda.toml
//! ```
//!
//! Per-event warnings are logged to stderr; set `RUST_LOG=debug` for
//! pipeline progress.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agenda_core::{
    select, EngineConfig, EngineError, EventId, FeedFetcher, HiddenSet, InMemoryHiddenStore,
    Pipeline, PipelineOutput, RefreshCoordinator, RefreshOutcome,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "agenda",
    version,
    about = "Calendar feed normalization and next-meeting selection"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FeedArgs {
    /// Feed file; repeat to concatenate several (reads from stdin if omitted)
    #[arg(short, long = "input", value_name = "FEED")]
    inputs: Vec<PathBuf>,
    /// Evaluate at this RFC 3339 instant instead of the current time
    #[arg(long, value_parser = parse_instant)]
    now: Option<DateTime<Utc>>,
    /// Engine configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalized events as JSON
    Events {
        #[command(flatten)]
        feed: FeedArgs,
    },
    /// Print the primary, upcoming and later meetings as JSON
    Select {
        #[command(flatten)]
        feed: FeedArgs,
        /// Event id to hide, as `<uid>@<YYYYMMDDTHHMMSSZ>`; repeatable
        #[arg(long = "hide", value_name = "ID")]
        hidden: Vec<EventId>,
    },
    /// Refresh the configured feeds on an interval and print each selection
    Watch {
        /// Engine configuration file listing the feeds (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Refresh once, print the selection and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Events { feed } => {
            let output = build_events(&feed, &HiddenSet::new())?;
            print_json(&output.events)
        }
        Commands::Select { feed, hidden } => {
            let hidden: HiddenSet = hidden.into_iter().collect();
            let output = build_events(&feed, &hidden)?;
            print_json(&select(&output.events, instant(&feed)))
        }
        Commands::Watch { config, once } => watch_feeds(&config, once),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn parse_instant(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 instant such as 2024-05-14T12:00:00Z: {e}"))
}

fn instant(feed: &FeedArgs) -> DateTime<Utc> {
    feed.now.unwrap_or_else(Utc::now)
}

fn build_events(feed: &FeedArgs, hidden: &HiddenSet) -> Result<PipelineOutput> {
    let config = load_config(feed.config.as_deref())?;
    let documents = read_inputs(&feed.inputs)?;
    Pipeline::new(config)
        .run(&documents, hidden, instant(feed))
        .context("Failed to build events from feed")
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn read_inputs(paths: &[PathBuf]) -> Result<Vec<String>> {
    if paths.is_empty() {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        return Ok(vec![buf]);
    }
    paths
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path.display()))
        })
        .collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Reads feeds from disk. Relative locations are taken from the directory of
/// the configuration file.
struct FileFetcher {
    base: PathBuf,
}

#[async_trait]
impl FeedFetcher for FileFetcher {
    async fn fetch(&self, location: &str) -> agenda_core::error::Result<String> {
        let path = self.base.join(location);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::Network {
                url: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn watch_feeds(config_path: &Path, once: bool) -> Result<()> {
    let config = load_config(Some(config_path))?;
    if config.feeds.is_empty() {
        anyhow::bail!("No feeds configured in {}", config_path.display());
    }
    let fetcher = FileFetcher {
        base: config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let coordinator = RefreshCoordinator::new(
        config,
        Arc::new(fetcher),
        Arc::new(InMemoryHiddenStore::new()),
    );

    if once {
        if let RefreshOutcome::Failed(err) = coordinator.trigger_refresh().await {
            return Err(err).context("Refresh failed");
        }
        return print_json(&coordinator.select(Utc::now()));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(err) => {
                tracing::error!(%err, "cannot listen for ctrl-c, stop the process to exit");
                std::future::pending::<()>().await;
            }
        }
    });

    let view = coordinator.clone();
    coordinator
        .run(shutdown_rx, move |_| {
            if let Err(err) = print_json(&view.select(Utc::now())) {
                tracing::error!(%err, "cannot print selection");
            }
        })
        .await;
    Ok(())
}
