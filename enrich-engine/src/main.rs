//! enrich-engine - Entity Enrichment Resolution service
//!
//! - `serve`: HTTP API (`/resolve`, `/resolve/batch`, `/analytics`, `/health`)
//! - `resolve`: one-shot resolution of identifiers, JSON on stdout
//!
//! Both share the SQLite cache and cost ledger under the root folder.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use enrich_common::config::{LoggingConfig, RootFolderInitializer, RootFolderResolver};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrich_engine::cache::SqliteCache;
use enrich_engine::config::{load_settings, Settings, MODULE_NAME};
use enrich_engine::ledger::SqliteLedger;
use enrich_engine::types::RequestHints;
use enrich_engine::{AppState, Engine, Orchestrator};

/// Command-line arguments for enrich-engine
#[derive(Parser, Debug)]
#[command(name = "enrich-engine")]
#[command(about = "Entity enrichment resolution engine")]
#[command(version)]
struct Args {
    /// Config file (overrides ENRICH_CONFIG and the default location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, global = true, env = "ENRICH_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long, env = "ENRICH_PORT")]
        port: Option<u16>,
    },

    /// Resolve identifiers and print the results as JSON
    Resolve {
        /// Domains or company names
        #[arg(required = true)]
        identifiers: Vec<String>,

        /// Known domain for a single company-name identifier
        #[arg(long)]
        known_domain: Option<String>,

        /// Known location (improves national phone number validation)
        #[arg(long)]
        known_location: Option<String>,

        /// Worker pool size for several identifiers
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = load_settings(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&settings.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        build = env!("ENRICH_BUILD_ID"),
        built_at = env!("ENRICH_BUILD_TIME"),
        "Starting enrich-engine"
    );

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_config_root(settings.root_folder.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = enrich_engine::db::init_database_pool(&db_path).await?;

    let orchestrator = Orchestrator::builder(settings.engine.clone())
        .cache(Arc::new(SqliteCache::new(db_pool.clone())))
        .ledger(Arc::new(SqliteLedger::new(db_pool.clone())))
        .build()
        .context("Failed to build resolution engine")?;
    let engine = Engine::new(orchestrator);

    match args.command {
        Command::Serve { host, port } => serve(engine, &settings, host, port).await,
        Command::Resolve {
            identifiers,
            known_domain,
            known_location,
            concurrency,
        } => {
            let output = if identifiers.len() == 1 {
                let hints = RequestHints {
                    known_domain,
                    known_location,
                };
                let result = engine.resolve_with_hints(&identifiers[0], hints).await?;
                serde_json::to_string_pretty(&result)?
            } else {
                let report = engine.resolve_batch(identifiers, concurrency).await;
                serde_json::to_string_pretty(&report)?
            };
            println!("{}", output);

            // Let the ledger writer drain before the runtime stops
            engine.orchestrator().ledger().flush().await?;
            Ok(())
        }
    }
}

async fn serve(engine: Engine, settings: &Settings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let shutdown = CancellationToken::new();
    let state = AppState::new(engine.clone(), shutdown.clone());
    let app = enrich_engine::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    engine.orchestrator().ledger().flush().await?;
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", logging.level).into());

    match &logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler; cancels running batches first
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
    shutdown.cancel();
}
