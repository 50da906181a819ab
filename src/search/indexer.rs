//! Corpus indexing: one search string and one unit vector per record.

use crate::catalog::ToolRecord;
use crate::error::{AppError, Result};
use crate::inference::Embedder;
use crate::search::index::{normalize_rows, FlatIpIndex, VectorIndex};
use crate::search::normalize::normalize;
use ndarray::Array2;

/// Build the text embedded for a record: name, description, category and
/// tags, skipping empty fields, normalized without query translation.
pub fn build_search_text(tool: &ToolRecord) -> String {
    let parts = [&tool.name, &tool.description, &tool.category, &tool.tags];
    let joined = parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    normalize(&joined)
}

/// An immutable corpus with its embeddings and similarity index.
///
/// Row `i` of `embeddings` and of the index always belongs to `corpus[i]`.
pub struct IndexedCorpus {
    corpus: Vec<ToolRecord>,
    embeddings: Array2<f32>,
    index: FlatIpIndex,
}

impl IndexedCorpus {
    /// Embed every record in corpus order and index the result.
    pub fn build(corpus: Vec<ToolRecord>, embedder: &dyn Embedder) -> Result<Self> {
        if corpus.is_empty() {
            return Err(AppError::EmptyCorpusError);
        }

        let start = std::time::Instant::now();
        let texts: Vec<String> = corpus.iter().map(build_search_text).collect();

        let embeddings = embedder
            .encode_batch(&texts)
            .map_err(|e| AppError::IndexBuildError(format!("Embedding corpus failed: {}", e)))?;

        let indexed = Self::from_parts(corpus, embeddings)?;

        tracing::info!(
            num_tools = indexed.len(),
            dimension = indexed.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search index built"
        );

        Ok(indexed)
    }

    /// Index precomputed embeddings, e.g. restored from a snapshot.
    ///
    /// Rows are L2-normalized before insertion, so inner product equals
    /// cosine similarity.
    pub fn from_parts(corpus: Vec<ToolRecord>, mut embeddings: Array2<f32>) -> Result<Self> {
        if embeddings.nrows() != corpus.len() {
            return Err(AppError::IndexBuildError(format!(
                "Embedding count mismatch: {} vectors for {} records",
                embeddings.nrows(),
                corpus.len()
            )));
        }
        if embeddings.ncols() == 0 {
            return Err(AppError::IndexBuildError(
                "Embeddings have zero dimension".to_string(),
            ));
        }

        normalize_rows(&mut embeddings);

        let mut index = FlatIpIndex::new(embeddings.ncols());
        index.add(&embeddings)?;

        Ok(Self {
            corpus,
            embeddings,
            index,
        })
    }

    pub fn corpus(&self) -> &[ToolRecord] {
        &self.corpus
    }

    pub fn embeddings(&self) -> &Array2<f32> {
        &self.embeddings
    }

    pub fn index(&self) -> &FlatIpIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }
}
