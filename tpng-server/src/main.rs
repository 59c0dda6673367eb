//! tpng-server - Main entry point
//!
//! Runs the HTTP API with its dispatch runner and retention pruner, or one
//! of the maintenance commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use tpng_common::config::{CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig};
use tpng_common::db::init_database;
use tpng_server::db::users::{make_site_admin, Promotion};
use tpng_server::executor::DispatchExecutor;
use tpng_server::live::LiveBroadcaster;
use tpng_server::pipeline::Pipeline;
use tpng_server::runner::{RunnerConfig, TaskRunner};
use tpng_server::services::{AppriseGateway, BlobStore, FsBlobStore, HttpForwarder, NotificationGateway};
use tpng_server::{build_router, pruner, AppState};

const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Command-line arguments for tpng-server
#[derive(Parser, Debug)]
#[command(name = "tpng-server")]
#[command(about = "Radio transmission ingestion and notification server")]
#[command(version)]
struct Args {
    /// Root folder holding the database and audio
    #[arg(short, long, env = "TPNG_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "TPNG_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "TPNG_BIND")]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Grant site admin to an existing user
    MakeSiteAdmin {
        user_id: Uuid,
    },
    /// Run one retention pass and exit
    PruneOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tpng_server={},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting tpng-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new("tpng-server")
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(initializer.audio_path()));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, blobs, &config, args.bind).await,
        Command::MakeSiteAdmin { user_id } => {
            match make_site_admin(&pool, user_id).await? {
                Promotion::Promoted => info!(user_id = %user_id, "User is now a site admin"),
                Promotion::AlreadyAdmin => info!(user_id = %user_id, "User was already a site admin"),
            }
            Ok(())
        }
        Command::PruneOnce => {
            let report = pruner::prune_once(&pool, blobs.as_ref(), chrono::Utc::now()).await?;
            info!(
                systems = report.systems,
                selected = report.selected,
                deleted = report.deleted,
                failed_batches = report.failed_batches,
                failed_systems = report.failed_systems,
                "Prune complete"
            );
            Ok(())
        }
    }
}

async fn serve(
    pool: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    config: &TomlConfig,
    bind: Option<String>,
) -> Result<()> {
    let job_timeout = Duration::from_secs(config.dispatch.job_timeout_secs);

    let gateway: Option<Arc<dyn NotificationGateway>> = match &config.apprise_api_url {
        Some(url) => {
            info!("Apprise gateway: {}", url);
            Some(Arc::new(AppriseGateway::new(url, job_timeout)?))
        }
        None => {
            warn!("No apprise_api_url configured; third-party alerts are disabled");
            None
        }
    };
    let forwarder = Arc::new(HttpForwarder::new(job_timeout)?);

    let live = LiveBroadcaster::new(config.broadcast_capacity.unwrap_or(DEFAULT_BROADCAST_CAPACITY));
    let executor = DispatchExecutor::new(live.clone(), blobs.clone(), gateway, forwarder);
    let (runner, runner_handle) = TaskRunner::start(RunnerConfig::from(&config.dispatch), Arc::new(executor));
    let pipeline = Pipeline::new(pool.clone(), runner);

    let shutdown = CancellationToken::new();
    let pruner_task = if config.pruner.enabled {
        let interval = Duration::from_secs(config.pruner.interval_hours.max(1) * 3600);
        Some(tokio::spawn(pruner::run_scheduled(
            pool.clone(),
            blobs.clone(),
            interval,
            shutdown.clone(),
        )))
    } else {
        info!("Retention pruner disabled");
        None
    };

    let state = AppState::new(pool, blobs, live, pipeline);
    let app = build_router(state);

    let addr = bind
        .or_else(|| config.bind_addr.clone())
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().bind_addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("tpng-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(task) = pruner_task {
        if let Err(e) = task.await {
            error!("Pruner task ended abnormally: {}", e);
        }
    }
    runner_handle.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
