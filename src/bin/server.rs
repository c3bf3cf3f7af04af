//! todosync server
//!
//! Serves the todo-list API, the WebSocket sync channel and, optionally, the
//! built web frontend.
//!
//! # Configuration
//!
//! Environment variables (override the config file):
//! - `TODOSYNC_PORT`: Port to listen on (default: 4000)
//! - `TODOSYNC_DATABASE_PATH`: SQLite database file (default: ~/.local/share/todosync/todosync.db)
//! - `TODOSYNC_STATIC_DIR`: Directory with the frontend build (default: none)
//! - `TODOSYNC_OWNER`: Owner for new lists (default: you)
//! - `TODOSYNC_CONFIG`: Path to config file (default: ~/.config/todosync/config.yaml)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check
//! - `GET /api/lists`, `GET /api/lists/{id}`: Read lists
//! - `POST /api/addlist`, `PATCH /api/todolist/{id}`: Create and rename lists
//! - `POST /api/sync`: Apply an item batch
//! - `GET /ws`: WebSocket sync channel

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todosync::config::Config;
use todosync::db::{init_db, ListRepository};
use todosync::server::{router, AppState};

#[derive(Parser)]
#[command(name = "todosync-server")]
#[command(version)]
#[command(about = "Todo list sync server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todosync=info,todosync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config)?;

    let port = cli.port.unwrap_or(config.port.value);
    tracing::info!(
        "Database: {} ({})",
        config.database_path.value.display(),
        config.database_path.source
    );

    let pool = init_db(&config.database_path.value).await?;
    let repo = ListRepository::new(pool);

    let state = AppState::new(repo.clone(), config.owner.value.clone());
    let app = router(state, config.static_dir.value.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    repo.close().await;
    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
