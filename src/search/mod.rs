//! Semantic search core: normalization, indexing, ranking and retrieval.

pub mod engine;
pub mod index;
pub mod indexer;
pub mod normalize;
pub mod ranking;

pub use engine::SearchEngine;
pub use index::{FlatIpIndex, VectorIndex};
pub use indexer::{build_search_text, IndexedCorpus};
pub use normalize::{normalize, preprocess_query};
pub use ranking::{parse_popularity, popularity_bonus};
