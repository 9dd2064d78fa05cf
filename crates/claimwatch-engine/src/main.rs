//! Engine binary for claimwatch.
//!
//! Wires configuration, the `PostgreSQL` store, the HTTP transport and the
//! tracing bulletin sink together and dispatches one subcommand.
//!
//! # Startup Sequence
//!
//! 1. Parse the command line
//! 2. Load configuration from `claimwatch-config.yaml` (or `--config`)
//! 3. Initialize structured logging (tracing)
//! 4. Connect to `PostgreSQL` and run migrations
//! 5. Record the first-run timestamp if it is missing
//! 6. Run the subcommand

mod error;
mod http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use claimwatch_core::config::ClaimwatchConfig;
use claimwatch_core::cycle::{self, CycleContext};
use claimwatch_core::inactivity::inactive_accounts;
use claimwatch_core::query::{ExportScope, QueryService};
use claimwatch_core::reconcile::reconcile_polities;
use claimwatch_core::report::TracingSink;
use claimwatch_core::runner;
use claimwatch_core::shutdown::Shutdown;
use claimwatch_db::{PostgresConfig, PostgresPool, Store};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::http::HttpTransport;

/// Land-claim ingestion and query engine.
#[derive(Parser, Debug)]
#[command(name = "claimwatch-engine")]
#[command(about = "Ingest settlement and account payloads and query the results")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "claimwatch-config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion cycle
    Run,
    /// Run cycles until interrupted
    Continuous {
        /// Minutes between cycles, overriding the configuration
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Store-wide statistics
    Stats,
    /// Largest settlements and polities by area
    Rankings {
        /// Entries per ranking
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Show one account
    Account {
        /// Account name
        name: String,
    },
    /// Show one settlement
    Settlement {
        /// Settlement name
        name: String,
    },
    /// Show one polity and its settlements
    Polity {
        /// Polity name
        name: String,
    },
    /// Search accounts, settlements and polities
    Search {
        /// Case-insensitive keyword
        keyword: String,
        /// Maximum results per table
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Compare two settlements
    Compare {
        /// First settlement
        first: String,
        /// Second settlement
        second: String,
    },
    /// List accounts idle for at least the given number of days
    Inactive {
        /// Threshold in days, defaulting to the expiry threshold
        #[arg(long)]
        days: Option<u64>,
    },
    /// Accounts seen within the last few hours
    Online {
        /// Window in hours
        #[arg(long, default_value_t = 1)]
        hours: u64,
    },
    /// Dump tables as JSON
    Export {
        /// Tables to include
        #[arg(long, value_enum, default_value_t = ExportKind::All)]
        kind: ExportKind,
        /// Write to this file instead of standard output
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recompute polity aggregates without ingesting
    Reconcile,
    /// Delete account rows not updated within the retention window
    Prune {
        /// Days to keep, overriding the configuration
        #[arg(long)]
        days: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportKind {
    Accounts,
    Settlements,
    Polities,
    All,
}

impl From<ExportKind> for ExportScope {
    fn from(kind: ExportKind) -> Self {
        match kind {
            ExportKind::Accounts => Self::Accounts,
            ExportKind::Settlements => Self::Settlements,
            ExportKind::Polities => Self::Polities,
            ExportKind::All => Self::All,
        }
    }
}

#[derive(Serialize)]
struct Rankings {
    settlements: Vec<claimwatch_db::SettlementRow>,
    polities: Vec<claimwatch_db::PolityRow>,
}

#[derive(Serialize)]
struct IdleEntry {
    account: String,
    last_activity: i64,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the database or the subcommand fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = ClaimwatchConfig::load_or_default(&args.config).map_err(EngineError::from)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        config = %args.config.display(),
        account_url = config.source.account_url,
        marker_url = config.source.marker_url,
        interval_minutes = config.schedule.interval_minutes,
        "claimwatch-engine starting"
    );

    let pool = PostgresPool::connect(
        &PostgresConfig::new(&config.storage.postgres_url)
            .with_max_connections(config.storage.max_connections)
            .with_connect_timeout(config.storage.connect_timeout()),
    )
    .await
    .map_err(EngineError::from)?;
    pool.run_migrations().await.map_err(EngineError::from)?;

    let result = dispatch(args.command, &config, &pool).await;
    pool.close().await;
    result.map_err(Into::into)
}

#[allow(clippy::too_many_lines)]
async fn dispatch(
    command: Command,
    config: &ClaimwatchConfig,
    pool: &PostgresPool,
) -> Result<(), EngineError> {
    let store = pool.store();
    let now = cycle::now_epoch();
    let first_run = cycle::ensure_first_run(&store, now).await?;
    let query = QueryService::new(&store);

    match command {
        Command::Run => {
            let transport = HttpTransport::new(&config.source)?;
            let shutdown = watch_ctrl_c();
            let ctx = CycleContext {
                store: &store,
                transport: &transport,
                sink: &TracingSink,
                config,
                shutdown: shutdown.as_ref(),
            };
            let report = cycle::run_cycle(&ctx, now).await?;
            print_json(&report)?;
        }
        Command::Continuous {
            interval,
            max_cycles,
        } => {
            let transport = HttpTransport::new(&config.source)?;
            let shutdown = watch_ctrl_c();
            let ctx = CycleContext {
                store: &store,
                transport: &transport,
                sink: &TracingSink,
                config,
                shutdown: shutdown.as_ref(),
            };
            let interval = interval.map_or_else(
                || config.schedule.interval(),
                |m| Duration::from_secs(m.saturating_mul(60)),
            );
            let summary = runner::run_continuous(&ctx, interval, max_cycles).await;
            print_json(&summary)?;
        }
        Command::Stats => print_json(&query.statistics().await?)?,
        Command::Rankings { limit } => print_json(&Rankings {
            settlements: query.top_settlements(limit).await?,
            polities: query.top_polities(limit).await?,
        })?,
        Command::Account { name } => {
            let profile = query.account_profile(&name).await?;
            print_json(&found(profile, "account", name)?)?;
        }
        Command::Settlement { name } => {
            let profile = query.settlement_profile(&name).await?;
            print_json(&found(profile, "settlement", name)?)?;
        }
        Command::Polity { name } => {
            let profile = query.polity_profile(&name).await?;
            print_json(&found(profile, "polity", name)?)?;
        }
        Command::Search { keyword, limit } => print_json(&query.search(&keyword, limit).await?)?,
        Command::Compare { first, second } => {
            let comparison = query.compare_settlements(&first, &second).await?;
            print_json(&found(comparison, "settlement", format!("{first} or {second}"))?)?;
        }
        Command::Inactive { days } => {
            let days = days.unwrap_or(config.inactivity.expire_after_days);
            let accounts = store.list_accounts().await?;
            let settlements = store.list_settlements().await?;
            let idle: Vec<IdleEntry> =
                inactive_accounts(&accounts, &settlements, first_run, now, days)
                    .into_iter()
                    .map(|(account, last_activity)| IdleEntry {
                        account,
                        last_activity,
                    })
                    .collect();
            info!(days, count = idle.len(), "Inactive accounts listed");
            print_json(&idle)?;
        }
        Command::Online { hours } => {
            let window = i64::try_from(hours.saturating_mul(3_600)).unwrap_or(i64::MAX);
            print_json(&query.recently_seen(now.saturating_sub(window)).await?)?;
        }
        Command::Export { kind, output } => {
            let export = query.export(kind.into(), now).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&export)?)?;
                    info!(path = %path.display(), "Export written");
                }
                None => print_json(&export)?,
            }
        }
        Command::Reconcile => print_json(&reconcile_polities(&store, now).await?)?,
        Command::Prune { days } => {
            let days = days.unwrap_or(config.retention.days_to_keep);
            let removed = cycle::prune_accounts(&store, days, now).await?;
            print_json(&serde_json::json!({ "removed": removed, "days_to_keep": days }))?;
        }
    }
    Ok(())
}

/// A [`Shutdown`] raised by the first Ctrl-C.
fn watch_ctrl_c() -> Arc<Shutdown> {
    let shutdown = Arc::new(Shutdown::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current write");
            signal.request();
        }
    });
    shutdown
}

fn found<T>(value: Option<T>, kind: &'static str, name: String) -> Result<T, EngineError> {
    value.ok_or(EngineError::NotFound { kind, name })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), EngineError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
