//! Index maintenance endpoints.

use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub tools_count: usize,
}

/// POST /index/rebuild - Reload the catalog, re-embed it and publish the new
/// index. Queries keep using the previous index until the swap.
pub async fn rebuild_handler(State(state): State<Arc<AppState>>) -> Result<Json<IndexResponse>> {
    let engine = Arc::clone(&state.engine);
    let catalog = state.catalog.clone();
    let snapshot_path = state.config.snapshot_path.clone();

    let tools_count = tokio::task::spawn_blocking(move || {
        let corpus = catalog.load()?;
        let tools_count = engine.rebuild(corpus)?;

        if let Err(e) = engine.save_index(&snapshot_path) {
            tracing::warn!(error = %e, "Failed to save snapshot after rebuild");
        }

        Ok::<usize, AppError>(tools_count)
    })
    .await
    .map_err(|e| AppError::IndexBuildError(format!("Task join error: {}", e)))??;

    Ok(Json(IndexResponse { tools_count }))
}

/// POST /index/save - Write the current index to the snapshot path.
pub async fn save_handler(State(state): State<Arc<AppState>>) -> Result<Json<IndexResponse>> {
    let engine = Arc::clone(&state.engine);
    let snapshot_path = state.config.snapshot_path.clone();

    let tools_count = tokio::task::spawn_blocking(move || {
        engine.save_index(&snapshot_path)?;
        Ok::<usize, AppError>(engine.corpus_size())
    })
    .await
    .map_err(|e| AppError::IoError(format!("Task join error: {}", e)))??;

    Ok(Json(IndexResponse { tools_count }))
}
