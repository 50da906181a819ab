//! Type definitions for the catalog module.

use serde::{Deserialize, Serialize};

/// One AI tool listing from the catalog.
///
/// Every record held in a corpus has a non-empty `description`; `name` is not
/// unique. Optional columns default to the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub name: String,
    pub url: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Usage count as listed, e.g. `"12,500+"`. Not guaranteed to parse.
    #[serde(default)]
    pub popularity: String,
    #[serde(default)]
    pub pricing: String,
    #[serde(default)]
    pub tags: String,
}

impl ToolRecord {
    /// Creates a record with only the required fields set.
    pub fn new(name: impl Into<String>, url: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: description.into(),
            category: String::new(),
            popularity: String::new(),
            pricing: String::new(),
            tags: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_popularity(mut self, popularity: impl Into<String>) -> Self {
        self.popularity = popularity.into();
        self
    }

    pub fn with_pricing(mut self, pricing: impl Into<String>) -> Self {
        self.pricing = pricing.into();
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }
}

/// A per-query copy of a [`ToolRecord`] with its scoring fields.
///
/// Serializes flat: the record's columns sit alongside the scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    #[serde(flatten)]
    pub tool: ToolRecord,
    /// Raw inner-product similarity between query and record embeddings.
    pub relevance_score: f64,
    /// `relevance_score` plus the capped popularity bonus.
    pub final_score: f64,
    /// 1-based position in the returned ordering.
    pub rank: usize,
}

impl ScoredResult {
    /// Result for selection modes that do not score by similarity; both
    /// scores are fixed at 1.0.
    pub fn unscored(tool: ToolRecord, rank: usize) -> Self {
        Self {
            tool,
            relevance_score: 1.0,
            final_score: 1.0,
            rank,
        }
    }
}
