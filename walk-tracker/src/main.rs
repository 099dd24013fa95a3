//! walk-tracker - turns a walk into a photo gallery
//!
//! Receives location samples over HTTP while a walk runs, records a
//! checkpoint at every stable location and fetches a nearby photo for each
//! one in the background.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walk_common::config::{
    config_file_path, load_or_create_toml_config, LoggingConfig, RootFolderInitializer,
    RootFolderResolver, TomlConfig,
};
use walk_common::events::{EventBus, WalkState};

use walk_tracker::services::{
    CheckpointStore, DirectoryPhotoStorage, FlickrSearchClient, HttpPhotoFetcher, PhotoSearchClient,
    WalkSession,
};
use walk_tracker::workflow::PipelineCoordinator;
use walk_tracker::{build_router, AppState};

const MODULE_NAME: &str = "walk-tracker";
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for walk-tracker
#[derive(Parser, Debug)]
#[command(name = "walk-tracker")]
#[command(about = "Walk tracker: checkpoints and nearby photos for every stable location")]
#[command(version)]
struct Args {
    /// Folder holding the database and downloaded photos
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "WALK_PORT")]
    port: Option<u16>,

    /// TOML config file (default: <config dir>/walk/walk-tracker.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<TomlConfig> {
    match args.config.clone().or_else(|| config_file_path(MODULE_NAME)) {
        Some(path) => load_or_create_toml_config(&path).context("Failed to load configuration"),
        None => Ok(TomlConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_config(&args)?;

    init_tracing(&toml_config.logging)?;

    // Build identification first, before any slow startup work
    info!(
        "Starting walk-tracker v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: Resolve and create the root folder
    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_config_path(args.config.clone())
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    // Step 2: Open or create the database
    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = walk_tracker::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 3: Pipeline dependencies
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let store = CheckpointStore::new(db_pool);

    let api_key = walk_tracker::config::resolve_flickr_api_key(&toml_config);
    let search_client = FlickrSearchClient::new(api_key, toml_config.search.clone())
        .map(|client| Arc::new(client) as Arc<dyn PhotoSearchClient>);
    if let Err(e) = &search_client {
        error!("Photo search unavailable: {}", e);
    }

    let fetcher = HttpPhotoFetcher::new(toml_config.search.timeout_secs.map(Duration::from_secs))
        .context("Failed to build photo fetcher")?;
    let storage = DirectoryPhotoStorage::new(initializer.photos_path());
    info!("Photo directory: {}", storage.root().display());

    let pipeline = Arc::new(PipelineCoordinator::new(
        store.clone(),
        event_bus.clone(),
        search_client,
        Arc::new(fetcher),
        Arc::new(storage),
    ));
    let session = Arc::new(WalkSession::new(
        store.clone(),
        Arc::clone(&pipeline),
        event_bus.clone(),
        toml_config.filter.clone(),
    ));

    // Step 4: HTTP surface
    let state = AppState::new(store, Arc::clone(&session), pipeline, event_bus);
    state.spawn_error_tracker();
    let app = build_router(state);

    let port = walk_tracker::config::resolve_port(args.port, &toml_config);
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if session.state().await == WalkState::Running {
        if let Err(e) = session.stop().await {
            warn!("Failed to stop walk on shutdown: {}", e);
        }
    }

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
                error!("Failed to install signal handler: {}", e);
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
