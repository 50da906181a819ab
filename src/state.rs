use crate::catalog::SqliteCatalog;
use crate::config::Config;
use crate::error::Result;
use crate::inference::{BiEncoder, Embedder};
use crate::persistence::try_load_snapshot;
use crate::search::{IndexedCorpus, SearchEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Application state shared across all request handlers.
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub catalog: SqliteCatalog,
    /// Bounds concurrent query embeddings to what the session pool can serve.
    pub semaphore: Arc<Semaphore>,
    /// Flag indicating an index is published and the model is warmed up
    pub ready: AtomicBool,
    pub config: Arc<Config>,
}

impl AppState {
    /// Load the embedding model, restore or build the index, and mark ready.
    ///
    /// A missing or corrupt snapshot falls back to the catalog; catalog,
    /// model and index build failures are fatal.
    pub fn new(config: Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(BiEncoder::load(&config)?);
        let catalog = SqliteCatalog::new(config.catalog_db_path.clone());

        let engine = initialize_engine(&config, &catalog, embedder)?;

        let state = Self::with_engine(engine, catalog, config);
        state.ready.store(true, Ordering::SeqCst);
        Ok(state)
    }

    /// Wrap an already built engine. The state starts out not ready.
    pub fn with_engine(engine: SearchEngine, catalog: SqliteCatalog, config: Config) -> Self {
        let permits = config.effective_permits();
        tracing::info!(permits, "Query concurrency configured");

        Self {
            engine: Arc::new(engine),
            catalog,
            semaphore: Arc::new(Semaphore::new(permits)),
            ready: AtomicBool::new(false),
            config: Arc::new(config),
        }
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

/// Restore the index from the configured snapshot, or build it from the
/// catalog and write a fresh snapshot.
pub fn initialize_engine(
    config: &Config,
    catalog: &SqliteCatalog,
    embedder: Arc<dyn Embedder>,
) -> Result<SearchEngine> {
    match try_load_snapshot(&config.snapshot_path)
        .and_then(|snapshot| snapshot.map(|s| IndexedCorpus::from_parts(s.corpus, s.embeddings)).transpose())
    {
        Ok(Some(indexed)) if !indexed.is_empty() => {
            tracing::info!(num_tools = indexed.len(), "Using snapshot index");
            return Ok(SearchEngine::new(indexed, embedder));
        }
        Ok(_) => {
            tracing::info!("No usable snapshot, building index from catalog");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Snapshot unusable, rebuilding from catalog");
        }
    }

    let corpus = catalog.load()?;
    let engine = SearchEngine::build(corpus, embedder)?;

    if let Err(e) = engine.save_index(&config.snapshot_path) {
        tracing::warn!(error = %e, "Failed to save snapshot");
    }

    Ok(engine)
}
