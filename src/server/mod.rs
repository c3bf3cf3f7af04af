//! HTTP and WebSocket front end.
//!
//! Requests are turned into list CRUD calls or [`SyncEngine`] batches; item
//! replies are always a fresh read of the list after the batch.

mod hub;
mod routes;
mod socket;

pub use hub::{ListChanged, ListHub, NO_SESSION};
pub use routes::{ApiError, ListView};
pub use socket::{dispatch, Session};

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::db::ListRepository;
use crate::sync::SyncEngine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: ListRepository,
    pub engine: Arc<SyncEngine<ListRepository>>,
    pub hub: Arc<ListHub>,
    /// Owner for new lists and list listings
    pub owner: Arc<str>,
}

impl AppState {
    pub fn new(repo: ListRepository, owner: impl Into<Arc<str>>) -> Self {
        Self {
            engine: Arc::new(SyncEngine::new(repo.clone())),
            repo,
            hub: Arc::new(ListHub::new()),
            owner: owner.into(),
        }
    }
}

/// Builds the router. With `static_dir`, unknown paths fall back to the
/// frontend build, and to its `index.html` for client-side routes.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health))
        .route("/api/lists", get(routes::get_lists))
        .route("/api/lists/{id}", get(routes::get_list))
        .route("/api/addlist", post(routes::add_list))
        .route("/api/todolist/{id}", patch(routes::rename_list))
        .route("/api/sync", post(routes::sync_items))
        .route("/ws", get(socket::ws_handler))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => {
            tracing::info!("Serving static files from {}", dir.display());
            let index = ServeFile::new(dir.join("index.html"));
            api.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
}
