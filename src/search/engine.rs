//! Query engine over the published index.
//!
//! The engine owns one [`IndexedCorpus`] at a time behind an `Arc`. Every
//! operation clones the `Arc` and works on that frozen value, so a rebuild or
//! snapshot restore swaps in a complete new index without readers ever seeing
//! a partial one.

use crate::catalog::{ScoredResult, ToolRecord};
use crate::error::{AppError, Result};
use crate::inference::Embedder;
use crate::persistence::Snapshot;
use crate::search::index::{normalize_vector, VectorIndex};
use crate::search::indexer::IndexedCorpus;
use crate::search::normalize::preprocess_query;
use crate::search::ranking::{parse_popularity, rank_hits};
use ndarray::Array1;
use rand::Rng;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

pub struct SearchEngine {
    current: RwLock<Arc<IndexedCorpus>>,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngine {
    pub fn new(indexed: IndexedCorpus, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            current: RwLock::new(Arc::new(indexed)),
            embedder,
        }
    }

    /// Embed and index `corpus`, then wrap it in an engine.
    pub fn build(corpus: Vec<ToolRecord>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let indexed = IndexedCorpus::build(corpus, embedder.as_ref())?;
        Ok(Self::new(indexed, embedder))
    }

    /// Restore an engine from a snapshot without re-embedding.
    pub fn from_snapshot(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let indexed = restore(path)?;
        Ok(Self::new(indexed, embedder))
    }

    /// The currently published index.
    pub fn current(&self) -> Arc<IndexedCorpus> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn publish(&self, indexed: IndexedCorpus) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(indexed);
    }

    pub fn corpus_size(&self) -> usize {
        self.current().len()
    }

    /// Semantic search for a free-text, possibly Hebrew, query.
    ///
    /// Empty or all-punctuation queries return no results. Embedding or index
    /// failures are reported as `QueryError` and leave the engine untouched.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let processed = preprocess_query(query);
        if processed.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(query, processed = %processed, top_k, "Searching");

        let embedding = self
            .embedder
            .encode(&processed)
            .map_err(|e| AppError::QueryError(format!("Embedding query failed: {}", e)))?;

        self.search_vector(embedding, top_k)
    }

    /// Rank the corpus against an already embedded query.
    pub fn search_vector(&self, mut query: Array1<f32>, top_k: usize) -> Result<Vec<ScoredResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let indexed = self.current();
        normalize_vector(&mut query);

        let (scores, ids) = indexed.index().search(&query, top_k).map_err(|e| match e {
            AppError::QueryError(_) => e,
            other => AppError::QueryError(other.to_string()),
        })?;

        let results = rank_hits(indexed.corpus(), &scores, &ids);

        tracing::debug!(results = results.len(), "Search completed");
        Ok(results)
    }

    /// Records whose category contains `category`, case-insensitively, in
    /// corpus order.
    pub fn search_by_category(&self, category: &str, top_k: usize) -> Vec<ScoredResult> {
        let indexed = self.current();
        let needle = category.to_lowercase();

        indexed
            .corpus()
            .iter()
            .filter(|tool| tool.category.to_lowercase().contains(&needle))
            .take(top_k)
            .enumerate()
            .map(|(i, tool)| ScoredResult::unscored(tool.clone(), i + 1))
            .collect()
    }

    /// Distinct non-empty categories, sorted.
    pub fn get_categories(&self) -> Vec<String> {
        self.current()
            .corpus()
            .iter()
            .filter(|tool| !tool.category.is_empty())
            .map(|tool| tool.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn get_random_tools(&self, count: usize) -> Vec<ScoredResult> {
        self.get_random_tools_with(count, &mut rand::thread_rng())
    }

    /// Uniform sample of `count` distinct records.
    ///
    /// When `count` covers the whole corpus, every record is returned in
    /// corpus order rather than shuffled.
    pub fn get_random_tools_with<R: Rng + ?Sized>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Vec<ScoredResult> {
        let indexed = self.current();
        let corpus = indexed.corpus();

        if count >= corpus.len() {
            return corpus
                .iter()
                .enumerate()
                .map(|(i, tool)| ScoredResult::unscored(tool.clone(), i + 1))
                .collect();
        }

        rand::seq::index::sample(rng, corpus.len(), count)
            .into_iter()
            .enumerate()
            .map(|(i, idx)| ScoredResult::unscored(corpus[idx].clone(), i + 1))
            .collect()
    }

    /// Records with a parseable popularity, most popular first. Equal counts
    /// keep corpus order.
    pub fn get_popular_tools(&self, top_k: usize) -> Vec<ScoredResult> {
        let indexed = self.current();

        let mut with_popularity: Vec<(i128, &ToolRecord)> = indexed
            .corpus()
            .iter()
            .filter_map(|tool| parse_popularity(&tool.popularity).map(|count| (count, tool)))
            .collect();

        with_popularity.sort_by(|a, b| b.0.cmp(&a.0));

        with_popularity
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, (_, tool))| ScoredResult::unscored(tool.clone(), i + 1))
            .collect()
    }

    /// Write the current corpus and embeddings to `path`.
    pub fn save_index(&self, path: &Path) -> Result<()> {
        let indexed = self.current();
        Snapshot::new(indexed.corpus().to_vec(), indexed.embeddings().clone()).save(path)
    }

    /// Replace the current index with the snapshot at `path`.
    ///
    /// On error the current index stays published.
    pub fn load_index(&self, path: &Path) -> Result<usize> {
        let indexed = restore(path)?;
        let size = indexed.len();
        self.publish(indexed);
        Ok(size)
    }

    /// Embed `corpus` into a fresh index and publish it.
    ///
    /// The old index keeps serving queries until the new one is complete.
    pub fn rebuild(&self, corpus: Vec<ToolRecord>) -> Result<usize> {
        let indexed = IndexedCorpus::build(corpus, self.embedder.as_ref())?;
        let size = indexed.len();
        self.publish(indexed);

        tracing::info!(num_tools = size, "Search index republished");
        metrics::counter!("index_rebuilds_total").increment(1);

        Ok(size)
    }
}

fn restore(path: &Path) -> Result<IndexedCorpus> {
    let snapshot = Snapshot::load(path)?;
    if snapshot.corpus.is_empty() {
        return Err(AppError::SnapshotCorruptError(
            "snapshot holds no records".to_string(),
        ));
    }
    IndexedCorpus::from_parts(snapshot.corpus, snapshot.embeddings)
        .map_err(|e| AppError::SnapshotCorruptError(e.to_string()))
}
