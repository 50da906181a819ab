//! Tool discovery handler.
//!
//! One endpoint serves every retrieval mode. The mode is picked from the
//! query string in this order:
//!
//! 1. `action=popular` - most used tools
//! 2. `action=random` - a random sample
//! 3. `category=...` - tools whose category contains the text
//! 4. non-empty `q` - semantic search, Hebrew terms translated
//! 5. otherwise a random sample

use crate::catalog::ScoredResult;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    /// Free-text query, English or Hebrew
    #[serde(default)]
    pub q: String,
    /// `popular` or `random`
    #[serde(default)]
    pub action: Option<String>,
    pub category: Option<String>,
    /// Result limit; each mode has its own default
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub results: Vec<ScoredResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Category,
    Popular,
    Random,
}

impl SearchParams {
    fn mode(&self) -> SearchMode {
        match self.action.as_deref() {
            Some("popular") => SearchMode::Popular,
            Some("random") => SearchMode::Random,
            _ if self.category.is_some() => SearchMode::Category,
            _ if !self.q.trim().is_empty() => SearchMode::Semantic,
            _ => SearchMode::Random,
        }
    }
}

/// GET /search - Find tools for a query, category or browsing action.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let start_time = Instant::now();

    if params.top_k == Some(0) {
        return Err(AppError::ValidationError(
            "top_k must be at least 1".to_string(),
        ));
    }

    let mode = params.mode();
    let config = &state.config;

    let results = match mode {
        SearchMode::Popular => state
            .engine
            .get_popular_tools(params.top_k.unwrap_or(config.popular_limit)),
        SearchMode::Random => state
            .engine
            .get_random_tools(params.top_k.unwrap_or(config.random_count)),
        SearchMode::Category => state.engine.search_by_category(
            params.category.as_deref().unwrap_or_default(),
            params.top_k.unwrap_or(config.category_limit),
        ),
        SearchMode::Semantic => {
            let top_k = params.top_k.unwrap_or(config.default_top_k);
            semantic_search(&state, params.q.clone(), top_k)
                .await
                .map_err(|e| {
                    metrics::counter!("search_errors_total").increment(1);
                    e
                })?
        }
    };

    let elapsed = start_time.elapsed();
    tracing::info!(
        mode = ?mode,
        query = %params.q,
        results = results.len(),
        total_ms = elapsed.as_millis() as u64,
        "Search completed"
    );

    metrics::counter!("search_requests_total").increment(1);
    metrics::histogram!("search_latency_ms").record(elapsed.as_millis() as f64);

    Ok(Json(SearchResponse { mode, results }))
}

/// Embed and rank off the async runtime, bounded by the semaphore and the
/// configured query timeout.
async fn semantic_search(
    state: &AppState,
    query: String,
    top_k: usize,
) -> Result<Vec<ScoredResult>> {
    // Acquire semaphore with timeout (503 if service overloaded)
    let _permit = tokio::time::timeout(Duration::from_secs(5), state.semaphore.acquire())
        .await
        .map_err(|_| {
            AppError::ResourceError("Service temporarily overloaded, please retry".to_string())
        })?
        .map_err(|_| AppError::ResourceError("Semaphore closed".to_string()))?;

    let engine = Arc::clone(&state.engine);
    let timeout_secs = state.config.query_timeout_secs;

    tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        tokio::task::spawn_blocking(move || engine.search(&query, top_k)),
    )
    .await
    .map_err(|_| AppError::QueryError(format!("Query timeout exceeded ({}s)", timeout_secs)))?
    .map_err(|e| AppError::QueryError(format!("Task join error: {}", e)))?
}
