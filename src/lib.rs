//! Aixplore - semantic search over a catalog of AI tools
//!
//! This library exposes the core components of the search service,
//! enabling integration tests and embedding in other applications.

pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod inference;
pub mod persistence;
pub mod search;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

// Re-export key types for convenience
pub use catalog::{ScoredResult, SqliteCatalog, ToolRecord};
pub use config::Config;
pub use error::{AppError, Result};
pub use handlers::{
    categories_handler, health_handler, ready_handler, rebuild_handler, save_handler,
    search_handler,
};
pub use inference::{BiEncoder, Embedder, SessionSlots};
pub use persistence::Snapshot;
pub use search::{IndexedCorpus, SearchEngine};
pub use state::AppState;

/// The JSON API routes, without middleware.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/search", get(search_handler))
        .route("/categories", get(categories_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .route("/index/save", post(save_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}
