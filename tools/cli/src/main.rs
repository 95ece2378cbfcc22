//! Outpost CLI - Command line interface for the offline sync layer.
//!
//! This tool wraps a file-backed local store and an HTTP remote backend,
//! exposing the gateway, sync engine, and cache warmer as one-shot
//! commands for inspection and scripting.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use outpost_remote::{HttpBackend, HttpBackendConfig};
use outpost_store::{FileStore, LocalStore, StoreHandle};
use outpost_sync::{
    EngineConfig, Gateway, GatewayConfig, MonitorConfig, NetworkMonitor, SyncEngine, SyncTrigger,
    WarmJob, Warmer, WarmerConfig,
};

#[derive(Parser)]
#[command(name = "outpost")]
#[command(about = "Outpost - Offline-first data synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory for the local cache and pending-operation log.
    #[arg(short, long, default_value = "./outpost-data")]
    data_dir: PathBuf,

    /// Base URL of the remote data service.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token for the remote data service.
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backlog counts and last-sync information.
    Status,

    /// Replay all pending operations against the remote now.
    Sync,

    /// List the pending-operation log.
    Pending,

    /// Retry a failed operation by id.
    Retry {
        /// Operation id, as shown by `pending`.
        id: String,
    },

    /// Discard a failed operation by id.
    Discard {
        /// Operation id, as shown by `pending`.
        id: String,
    },

    /// Fetch rows from a collection, falling back to the cache.
    Fetch {
        /// Collection name.
        collection: String,

        /// JSON filter object, e.g. '{"user_id": "u1"}'.
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Insert a record, queueing it if the remote is unreachable.
    Insert {
        /// Collection name.
        collection: String,

        /// JSON record to insert.
        record: String,
    },

    /// Delete records matching a criteria object.
    Delete {
        /// Collection name.
        collection: String,

        /// JSON criteria object, e.g. '{"id": "42"}'.
        criteria: String,
    },

    /// Prefetch collections into the cache.
    Warm {
        /// Collections to fetch in full.
        #[arg(short, long)]
        all: Vec<String>,

        /// User-scoped collections, as `collection:field` pairs.
        #[arg(short, long)]
        by_user: Vec<String>,

        /// User id for user-scoped jobs.
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Drop all cached data (the pending log is kept).
    ClearCache,
}

/// Wired-up components shared by the commands.
struct App {
    store: Arc<StoreHandle>,
    engine: Arc<SyncEngine>,
    gateway: Arc<Gateway>,
}

impl App {
    async fn open(cli: &Cli) -> Result<Self> {
        let file_store = FileStore::open(&cli.data_dir)
            .await
            .context("Failed to open local store")?;
        let store = Arc::new(StoreHandle::new(Arc::new(file_store)));

        let backend = Arc::new(HttpBackend::new(HttpBackendConfig {
            base_url: cli.url.clone(),
            auth_token: cli.token.clone(),
            ..Default::default()
        }));

        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            backend.clone(),
            EngineConfig::default(),
        ));

        // One-shot commands drive the engine directly, so trigger
        // requests have no worker to wake and are dropped.
        let (trigger, _rx) = SyncTrigger::channel();
        let monitor = Arc::new(NetworkMonitor::new(
            store.clone(),
            trigger.clone(),
            MonitorConfig::default(),
        ));
        let gateway = Arc::new(Gateway::new(
            store.clone(),
            backend,
            monitor,
            trigger,
            GatewayConfig::default(),
        ));

        Ok(Self {
            store,
            engine,
            gateway,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let app = App::open(&cli).await?;

    match cli.command {
        Commands::Status => cmd_status(&app).await,

        Commands::Sync => cmd_sync(&app).await,

        Commands::Pending => cmd_pending(&app).await,

        Commands::Retry { id } => cmd_retry(&app, &id).await,

        Commands::Discard { id } => cmd_discard(&app, &id).await,

        Commands::Fetch { collection, filter } => {
            cmd_fetch(&app, &collection, filter.as_deref()).await
        }

        Commands::Insert { collection, record } => cmd_insert(&app, &collection, &record).await,

        Commands::Delete {
            collection,
            criteria,
        } => cmd_delete(&app, &collection, &criteria).await,

        Commands::Warm { all, by_user, user } => {
            cmd_warm(&app, all, by_user, user.as_deref()).await
        }

        Commands::ClearCache => cmd_clear_cache(&app).await,
    }
}

fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid {} JSON", what))
}

async fn cmd_status(app: &App) -> Result<()> {
    let status = app.engine.status().await?;

    println!("Pending operations: {}", status.pending_operations);
    println!("Failed operations:  {}", status.failed_operations);
    match status.last_sync {
        Some(at) => println!("Last sync:          {}", at.to_rfc3339()),
        None => println!("Last sync:          never"),
    }
    if app.store.is_degraded() {
        println!("Local store:        degraded (memory only)");
    }

    Ok(())
}

async fn cmd_sync(app: &App) -> Result<()> {
    let report = app.engine.sync_pending().await?;

    println!("Synced: {}", report.synced);
    println!("Failed: {}", report.failed);
    for failure in &report.details {
        let state = if failure.exhausted { "exhausted" } else { "will retry" };
        println!(
            "  {} {} [{}]: {}",
            failure.collection, failure.kind, state, failure.error
        );
    }

    if !report.success {
        anyhow::bail!("Sync finished with failures");
    }
    Ok(())
}

async fn cmd_pending(app: &App) -> Result<()> {
    let ops = app.store.list_operations().await?;

    if ops.is_empty() {
        println!("No pending operations.");
        return Ok(());
    }

    for op in ops {
        println!(
            "{}  {}  {}  retries={}  status={:?}  enqueued={}",
            op.id,
            op.collection,
            op.action.kind(),
            op.retry_count,
            op.status,
            op.enqueued_at.to_rfc3339(),
        );
        if let Some(err) = &op.last_error {
            println!("    last error: {}", err);
        }
    }

    Ok(())
}

async fn cmd_retry(app: &App, id: &str) -> Result<()> {
    app.engine
        .reset_failed_operation(id)
        .await
        .context("Failed to reset operation")?;
    println!("Operation {} queued for retry.", id);
    Ok(())
}

async fn cmd_discard(app: &App, id: &str) -> Result<()> {
    app.engine
        .discard_failed_operation(id)
        .await
        .context("Failed to discard operation")?;
    println!("Operation {} discarded.", id);
    Ok(())
}

async fn cmd_fetch(app: &App, collection: &str, filter: Option<&str>) -> Result<()> {
    let filter = filter.map(|raw| parse_json(raw, "filter")).transpose()?;

    let response = app.gateway.select(collection, filter).await?;
    if response.offline {
        eprintln!("(served from cache)");
    }
    if let Some(data) = response.data {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}

async fn cmd_insert(app: &App, collection: &str, record: &str) -> Result<()> {
    let record = parse_json(record, "record")?;

    let response = app.gateway.insert(collection, record).await?;
    if response.offline {
        eprintln!("(queued for sync)");
    }
    if let Some(data) = response.data {
        println!("{}", serde_json::to_string_pretty(&data)?);
    }

    Ok(())
}

async fn cmd_delete(app: &App, collection: &str, criteria: &str) -> Result<()> {
    let criteria = parse_json(criteria, "criteria")?;

    let response = app.gateway.delete(collection, criteria).await?;
    if response.offline {
        eprintln!("(queued for sync)");
    }
    println!("Deleted.");

    Ok(())
}

async fn cmd_warm(
    app: &App,
    all: Vec<String>,
    by_user: Vec<String>,
    user: Option<&str>,
) -> Result<()> {
    let mut jobs: Vec<WarmJob> = all.iter().map(|c| WarmJob::all(c)).collect();
    for pair in &by_user {
        let (collection, field) = pair
            .split_once(':')
            .context("--by-user expects collection:field")?;
        jobs.push(WarmJob::by_user(collection, field));
    }

    if jobs.is_empty() {
        anyhow::bail!("Nothing to warm. Pass --all and/or --by-user.");
    }

    let warmer = Warmer::new(app.gateway.clone(), WarmerConfig { jobs });
    let report = warmer.warm(user).await?;

    for collection in &report.warmed {
        println!("warmed  {}", collection);
    }
    for (collection, error) in &report.failed {
        println!("failed  {}: {}", collection, error);
    }

    Ok(())
}

async fn cmd_clear_cache(app: &App) -> Result<()> {
    app.store.clear_cache().await?;
    println!("Cache cleared.");
    Ok(())
}
