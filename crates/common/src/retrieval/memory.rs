//! In-process vector store
//!
//! Keeps records in memory and ranks them with the same hybrid semantics as the
//! Qdrant backend: filter first, rank dense and sparse separately, fuse with RRF.

use super::{
    Metadata, QueryMode, RetrievedNode, SparseEncoder, SparseVector, VectorStore,
    VectorStoreQuery,
};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Rank offset in the reciprocal rank score `1 / (k + rank)`
const RRF_K: f32 = 60.0;

/// Record format accepted by [`InMemoryVectorStore::load_seed_file`]
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

struct StoredRecord {
    id: String,
    text: String,
    metadata: Metadata,
    dense: Vec<f32>,
    sparse: SparseVector,
}

impl StoredRecord {
    fn to_node(&self, score: f32) -> RetrievedNode {
        RetrievedNode {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
            score,
        }
    }
}

/// Vector store backed by process memory
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, sparse_encoder: Arc<dyn SparseEncoder>) -> Self {
        Self {
            embedder,
            sparse_encoder,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Embed and index a text chunk, returning its id
    pub async fn add_text(&self, text: &str, metadata: Metadata) -> Result<String> {
        self.insert(Uuid::new_v4().to_string(), text, metadata).await
    }

    async fn insert(&self, id: String, text: &str, metadata: Metadata) -> Result<String> {
        let dense = self.embedder.embed(text).await?;
        let sparse = self.sparse_encoder.encode(text);

        self.records.write().await.push(StoredRecord {
            id: id.clone(),
            text: text.to_string(),
            metadata,
            dense,
            sparse,
        });

        Ok(id)
    }

    /// Load a JSON array of [`SeedRecord`]s; returns the number indexed
    pub async fn load_seed_file(&self, path: &str) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path).await?;
        let records: Vec<SeedRecord> = serde_json::from_str(&raw)?;
        let count = records.len();

        for record in records {
            let id = record.id.unwrap_or_else(|| Uuid::new_v4().to_string());
            self.insert(id, &record.text, record.metadata).await?;
        }

        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn rank(mut scored: Vec<(f32, &StoredRecord)>, top_k: usize) -> Vec<RetrievedNode> {
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, record)| record.to_node(score))
            .collect()
    }

    fn search(&self, records: &[StoredRecord], query: &VectorStoreQuery) -> Result<Vec<RetrievedNode>> {
        let candidates: Vec<&StoredRecord> = records
            .iter()
            .filter(|r| query.filters.matches(&r.metadata))
            .collect();

        let dense_results = match (&query.dense, query.mode) {
            (Some(embedding), QueryMode::Default | QueryMode::Hybrid) => {
                let scored = candidates
                    .iter()
                    .map(|r| (cosine_similarity(embedding, &r.dense), *r))
                    .collect();
                Some(Self::rank(scored, query.similarity_top_k))
            }
            _ => None,
        };

        let sparse_results = match (&query.sparse, query.mode) {
            (Some(sparse), QueryMode::Sparse | QueryMode::Hybrid) => {
                let scored = candidates
                    .iter()
                    .map(|r| (sparse.dot(&r.sparse), *r))
                    .filter(|(score, _)| *score > 0.0)
                    .collect();
                Some(Self::rank(scored, query.sparse_top_k))
            }
            _ => None,
        };

        match (dense_results, sparse_results) {
            (Some(dense), Some(sparse)) => {
                Ok(reciprocal_rank_fusion([dense, sparse], query.similarity_top_k))
            }
            (Some(dense), None) => Ok(dense),
            (None, Some(sparse)) => Ok(sparse),
            (None, None) => Err(AppError::Validation {
                message: format!("Query mode {:?} requires a matching query vector", query.mode),
                field: None,
            }),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn query(&self, query: &VectorStoreQuery) -> Result<Vec<RetrievedNode>> {
        let start = Instant::now();
        let records = self.records.read().await;
        let result = self.search(&records, query);

        metrics::record_vector_query(
            start.elapsed().as_secs_f64(),
            self.name(),
            result.as_ref().map(Vec::len).unwrap_or(0),
            result.is_ok(),
        );
        result
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Merge rankings by record id; a record's score is the sum of its reciprocal ranks
fn reciprocal_rank_fusion(rankings: [Vec<RetrievedNode>; 2], top_k: usize) -> Vec<RetrievedNode> {
    let mut fused: HashMap<String, RetrievedNode> = HashMap::new();

    for ranking in rankings {
        for (rank, node) in ranking.into_iter().enumerate() {
            let contribution = 1.0 / (RRF_K + rank as f32 + 1.0);
            fused
                .entry(node.id.clone())
                .and_modify(|existing| existing.score += contribution)
                .or_insert(RetrievedNode {
                    score: contribution,
                    ..node
                });
        }
    }

    let mut nodes: Vec<RetrievedNode> = fused.into_values().collect();
    nodes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    nodes.truncate(top_k);
    nodes
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::retrieval::{HashingSparseEncoder, MetadataFilter, MetadataFilters};
    use serde_json::json;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(
            Arc::new(MockEmbedder::new(16)),
            Arc::new(HashingSparseEncoder::default()),
        )
    }

    fn doc(id: &str) -> Metadata {
        json!({ "document_metadata_id": id })
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    async fn query_for(store: &InMemoryVectorStore, text: &str, doc_id: &str) -> VectorStoreQuery {
        VectorStoreQuery {
            dense: Some(store.embedder.embed(text).await.unwrap()),
            sparse: Some(store.sparse_encoder.encode(text)),
            similarity_top_k: 100,
            sparse_top_k: 20,
            filters: MetadataFilters::new(vec![MetadataFilter::exact_match(
                "document_metadata_id",
                doc_id,
            )]),
            mode: QueryMode::Hybrid,
        }
    }

    #[tokio::test]
    async fn test_filter_applies_before_ranking() {
        let store = store();
        store.add_text("The contract term is five years.", doc("doc1")).await.unwrap();
        store.add_text("The contract term is two years.", doc("doc2")).await.unwrap();
        store.add_text("Payment is due monthly.", doc("doc1")).await.unwrap();

        let query = query_for(&store, "contract term", "doc1").await;
        let results = store.query(&query).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|n| n.metadata["document_metadata_id"] == "doc1"));
        assert_eq!(results[0].text, "The contract term is five years.");
    }

    #[tokio::test]
    async fn test_unknown_document_returns_nothing() {
        let store = store();
        store.add_text("The contract term is five years.", doc("doc1")).await.unwrap();

        let query = query_for(&store, "contract term", "missing").await;
        assert!(store.query(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sparse_top_k_limits_keyword_candidates() {
        let store = store();
        for i in 0..5 {
            store
                .add_text(&format!("invoice number {}", i), doc("doc1"))
                .await
                .unwrap();
        }

        let mut query = query_for(&store, "invoice", "doc1").await;
        query.mode = QueryMode::Sparse;
        query.sparse_top_k = 2;
        assert_eq!(store.query(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_vector_for_mode_is_rejected() {
        let store = store();
        let query = VectorStoreQuery {
            dense: None,
            sparse: None,
            similarity_top_k: 10,
            sparse_top_k: 10,
            filters: MetadataFilters::default(),
            mode: QueryMode::Default,
        };
        assert!(matches!(
            store.query(&query).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_seed_file_loading() {
        let path = std::env::temp_dir().join(format!("seed-{}.json", Uuid::new_v4()));
        let seed = json!([
            { "id": "c1", "text": "Termination requires 30 days notice.", "metadata": { "document_metadata_id": "doc1" } },
            { "text": "Unscoped record" }
        ]);
        tokio::fs::write(&path, seed.to_string()).await.unwrap();

        let store = store();
        let loaded = store.load_seed_file(path.to_str().unwrap()).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(loaded, 2);
        assert_eq!(store.len().await, 2);

        let query = query_for(&store, "termination notice", "doc1").await;
        let results = store.query(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c1");
    }

    fn ranked(ids: &[&str]) -> Vec<RetrievedNode> {
        ids.iter()
            .map(|id| RetrievedNode {
                id: id.to_string(),
                text: format!("chunk {}", id),
                metadata: Metadata::new(),
                score: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_fusion_favours_records_in_both_rankings() {
        let fused = reciprocal_rank_fusion([ranked(&["a", "b", "c"]), ranked(&["c", "a"])], 10);

        let ids: Vec<&str> = fused.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert!((fused[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
        assert_eq!(fused[0].text, "chunk a");
    }

    #[test]
    fn test_fusion_ties_break_by_id_and_truncate() {
        let fused = reciprocal_rank_fusion([ranked(&["b"]), ranked(&["a"])], 10);
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[1].id, "b");

        let top = reciprocal_rank_fusion([ranked(&["a", "b", "c"]), Vec::new()], 2);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
