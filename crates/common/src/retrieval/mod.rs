//! Hybrid vector retrieval
//!
//! Provides:
//! - Dense + sparse query construction with metadata filters
//! - A Qdrant backend (prefetch + RRF fusion server-side)
//! - An in-memory backend with the same semantics (development, tests)

mod memory;
mod qdrant;
mod sparse;

pub use memory::{InMemoryVectorStore, SeedRecord};
pub use qdrant::QdrantVectorStore;
pub use sparse::{HashingSparseEncoder, SparseEncoder, SparseVector};

use crate::config::VectorStoreConfig;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload/metadata attached to an indexed record
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Retrieved record with relevance score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedNode {
    /// Point ID in the store
    pub id: String,

    /// Chunk text
    pub text: String,

    /// Record metadata (includes the document identifier)
    pub metadata: Metadata,

    /// Relevance score (higher is better)
    pub score: f32,
}

/// Which similarity signals a query uses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Dense similarity only
    Default,
    /// Sparse (keyword-weighted) similarity only
    Sparse,
    /// Dense and sparse fused into one ranking
    #[default]
    Hybrid,
}

/// Exact-match constraint on one metadata key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
}

impl MetadataFilter {
    pub fn exact_match(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check a record's metadata against this filter
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match metadata.get(&self.key) {
            Some(serde_json::Value::String(s)) => s == &self.value,
            Some(serde_json::Value::Number(n)) => n.to_string() == self.value,
            Some(serde_json::Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

/// AND-combined metadata filters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilters {
    pub filters: Vec<MetadataFilter>,
}

impl MetadataFilters {
    pub fn new(filters: Vec<MetadataFilter>) -> Self {
        Self { filters }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.filters.iter().all(|f| f.matches(metadata))
    }
}

/// Query against a vector store
#[derive(Debug, Clone)]
pub struct VectorStoreQuery {
    /// Dense query embedding
    pub dense: Option<Vec<f32>>,

    /// Sparse query vector
    pub sparse: Option<SparseVector>,

    /// Dense candidates; also the size of the fused result
    pub similarity_top_k: usize,

    /// Sparse candidates
    pub sparse_top_k: usize,

    /// Metadata constraints applied before ranking
    pub filters: MetadataFilters,

    pub mode: QueryMode,
}

/// Common trait for vector store backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Retrieve records matching the query, best first
    async fn query(&self, query: &VectorStoreQuery) -> Result<Vec<RetrievedNode>>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs and metrics
    fn name(&self) -> &str;
}

/// Create a vector store based on configuration
pub async fn create_vector_store(
    config: &VectorStoreConfig,
    embedder: Arc<dyn Embedder>,
    sparse_encoder: Arc<dyn SparseEncoder>,
) -> Result<Arc<dyn VectorStore>> {
    match config.provider.as_str() {
        "qdrant" => Ok(Arc::new(QdrantVectorStore::new(config)?)),
        "memory" => {
            let store = InMemoryVectorStore::new(embedder, sparse_encoder);
            if let Some(path) = &config.seed_path {
                let loaded = store.load_seed_file(path).await?;
                tracing::info!(path = %path, records = loaded, "Seeded in-memory vector store");
            }
            Ok(Arc::new(store))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown vector store provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_exact_match_filter() {
        let filter = MetadataFilter::exact_match("document_metadata_id", "doc1");
        assert!(filter.matches(&metadata(json!({ "document_metadata_id": "doc1" }))));
        assert!(!filter.matches(&metadata(json!({ "document_metadata_id": "doc2" }))));
        assert!(!filter.matches(&metadata(json!({ "other": "doc1" }))));
    }

    #[test]
    fn test_numeric_metadata_matches_string_value() {
        let filter = MetadataFilter::exact_match("page", "3");
        assert!(filter.matches(&metadata(json!({ "page": 3 }))));
    }

    #[test]
    fn test_filters_are_and_combined() {
        let filters = MetadataFilters::new(vec![
            MetadataFilter::exact_match("document_metadata_id", "doc1"),
            MetadataFilter::exact_match("lang", "en"),
        ]);
        assert!(filters.matches(&metadata(json!({ "document_metadata_id": "doc1", "lang": "en" }))));
        assert!(!filters.matches(&metadata(json!({ "document_metadata_id": "doc1", "lang": "de" }))));
        assert!(MetadataFilters::default().matches(&Metadata::new()));
    }
}
