//! Qdrant backend
//!
//! Hybrid queries are sent as two prefetch branches (named dense and sparse
//! vectors) fused server-side with RRF. The document filter is attached to each
//! branch so candidates are restricted before ranking.

use super::{Metadata, QueryMode, RetrievedNode, VectorStore, VectorStoreQuery};
use crate::config::VectorStoreConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, Filter, Fusion, PrefetchQueryBuilder, Query,
    QueryPoints, QueryPointsBuilder, ScoredPoint, Value as QdrantValue, VectorInput,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Collection and named vectors a query targets
#[derive(Debug, Clone)]
struct CollectionLayout {
    collection: String,
    dense_vector_name: String,
    sparse_vector_name: String,
}

impl CollectionLayout {
    fn request(&self, query: &VectorStoreQuery) -> Result<QueryPoints> {
        let filter = build_filter(query);
        let base = QueryPointsBuilder::new(self.collection.clone()).with_payload(true);

        let request = match (query.mode, &query.dense, &query.sparse) {
            (QueryMode::Hybrid, Some(dense), Some(sparse)) => {
                let mut dense_branch = PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(dense.clone()))
                    .using(self.dense_vector_name.clone())
                    .limit(query.similarity_top_k as u64);
                let mut sparse_branch = PrefetchQueryBuilder::default()
                    .query(Query::new_nearest(VectorInput::new_sparse(
                        sparse.indices.clone(),
                        sparse.values.clone(),
                    )))
                    .using(self.sparse_vector_name.clone())
                    .limit(query.sparse_top_k as u64);
                if let Some(filter) = &filter {
                    dense_branch = dense_branch.filter(filter.clone());
                    sparse_branch = sparse_branch.filter(filter.clone());
                }

                base.add_prefetch(dense_branch)
                    .add_prefetch(sparse_branch)
                    .query(Query::new_fusion(Fusion::Rrf))
                    .limit(query.similarity_top_k as u64)
            }
            (QueryMode::Default | QueryMode::Hybrid, Some(dense), _) => base
                .query(Query::new_nearest(dense.clone()))
                .using(self.dense_vector_name.clone())
                .limit(query.similarity_top_k as u64),
            (QueryMode::Sparse | QueryMode::Hybrid, _, Some(sparse)) => base
                .query(Query::new_nearest(VectorInput::new_sparse(
                    sparse.indices.clone(),
                    sparse.values.clone(),
                )))
                .using(self.sparse_vector_name.clone())
                .limit(query.sparse_top_k as u64),
            (mode, _, _) => {
                return Err(AppError::Validation {
                    message: format!("Query mode {:?} requires a matching query vector", mode),
                    field: None,
                })
            }
        };

        let request = match filter {
            Some(filter) => request.filter(filter),
            None => request,
        };
        Ok(request.build())
    }
}

/// Qdrant client scoped to one collection
pub struct QdrantVectorStore {
    client: Qdrant,
    layout: CollectionLayout,
}

impl QdrantVectorStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create Qdrant client: {}", e),
            })?;

        Ok(Self {
            client,
            layout: CollectionLayout {
                collection: config.collection.clone(),
                dense_vector_name: config.dense_vector_name.clone(),
                sparse_vector_name: config.sparse_vector_name.clone(),
            },
        })
    }

    async fn execute(&self, query: &VectorStoreQuery) -> Result<Vec<RetrievedNode>> {
        let request = self.layout.request(query)?;

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| AppError::VectorStoreError {
                message: format!("Qdrant query failed: {}", e),
            })?;

        Ok(response.result.into_iter().map(into_node).collect())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn query(&self, query: &VectorStoreQuery) -> Result<Vec<RetrievedNode>> {
        let start = Instant::now();
        let result = self.execute(query).await;

        metrics::record_vector_query(
            start.elapsed().as_secs_f64(),
            self.name(),
            result.as_ref().map(Vec::len).unwrap_or(0),
            result.is_ok(),
        );

        if let Err(e) = &result {
            tracing::warn!(collection = %self.layout.collection, error = %e, "Vector query failed");
        }
        result
    }

    async fn ping(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(self.layout.collection.as_str())
            .await
            .map_err(|e| AppError::VectorStoreError {
                message: format!("Qdrant unreachable: {}", e),
            })?;

        if exists {
            Ok(())
        } else {
            Err(AppError::VectorStoreError {
                message: format!("Collection {} does not exist", self.layout.collection),
            })
        }
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

fn build_filter(query: &VectorStoreQuery) -> Option<Filter> {
    if query.filters.is_empty() {
        return None;
    }

    Some(Filter::must(
        query
            .filters
            .filters
            .iter()
            .map(|f| Condition::matches(f.key.clone(), f.value.clone())),
    ))
}

fn to_json(value: QdrantValue) -> Value {
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => Value::from(d),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

/// Convert a scored point, reading text from `text` or the serialized node content
fn into_node(point: ScoredPoint) -> RetrievedNode {
    let mut payload: Metadata = point
        .payload
        .into_iter()
        .map(|(k, v)| (k, to_json(v)))
        .collect();

    let text = match payload.remove("text") {
        Some(Value::String(text)) => text,
        _ => payload
            .remove("_node_content")
            .and_then(|content| match content {
                Value::String(raw) => serde_json::from_str::<Value>(&raw).ok(),
                other => Some(other),
            })
            .and_then(|node| node.get("text").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default(),
    };
    payload.remove("_node_content");

    let id = match point.id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u,
        None => String::new(),
    };

    RetrievedNode {
        id,
        text,
        metadata: payload,
        score: point.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{MetadataFilter, MetadataFilters, SparseVector};
    use qdrant_client::qdrant::PointId;
    use serde_json::json;
    use std::collections::HashMap;

    fn layout() -> CollectionLayout {
        let config = VectorStoreConfig::default();
        CollectionLayout {
            collection: config.collection,
            dense_vector_name: config.dense_vector_name,
            sparse_vector_name: config.sparse_vector_name,
        }
    }

    fn hybrid_query() -> VectorStoreQuery {
        VectorStoreQuery {
            dense: Some(vec![0.1, 0.2]),
            sparse: Some(SparseVector {
                indices: vec![3, 7],
                values: vec![1.0, 1.5],
            }),
            similarity_top_k: 100,
            sparse_top_k: 20,
            filters: MetadataFilters::new(vec![MetadataFilter::exact_match(
                "document_metadata_id",
                "doc1",
            )]),
            mode: QueryMode::Hybrid,
        }
    }

    fn doc_filter() -> Filter {
        Filter::must([Condition::matches(
            "document_metadata_id",
            "doc1".to_string(),
        )])
    }

    fn string_value(s: &str) -> QdrantValue {
        QdrantValue {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_hybrid_request_uses_prefetch_and_rrf() {
        let request = layout().request(&hybrid_query()).unwrap();

        assert_eq!(request.collection_name, "documents");
        assert_eq!(request.query, Some(Query::new_fusion(Fusion::Rrf)));
        assert_eq!(request.limit, Some(100));
        assert_eq!(request.filter, Some(doc_filter()));

        assert_eq!(request.prefetch.len(), 2);
        let dense = &request.prefetch[0];
        assert_eq!(dense.using.as_deref(), Some("text-dense"));
        assert_eq!(dense.limit, Some(100));
        assert_eq!(dense.filter, Some(doc_filter()));

        let sparse = &request.prefetch[1];
        assert_eq!(sparse.using.as_deref(), Some("text-sparse"));
        assert_eq!(sparse.limit, Some(20));
        assert_eq!(sparse.filter, Some(doc_filter()));
        assert_eq!(
            sparse.query,
            Some(Query::new_nearest(VectorInput::new_sparse(
                vec![3u32, 7],
                vec![1.0f32, 1.5]
            )))
        );
    }

    #[test]
    fn test_dense_only_request() {
        let mut query = hybrid_query();
        query.mode = QueryMode::Default;
        let request = layout().request(&query).unwrap();

        assert!(request.prefetch.is_empty());
        assert_eq!(request.using.as_deref(), Some("text-dense"));
        assert_eq!(request.query, Some(Query::new_nearest(vec![0.1f32, 0.2])));
    }

    #[test]
    fn test_unfiltered_request_has_no_filter() {
        let mut query = hybrid_query();
        query.filters = MetadataFilters::default();
        let request = layout().request(&query).unwrap();

        assert!(request.filter.is_none());
        assert!(request.prefetch.iter().all(|p| p.filter.is_none()));
    }

    #[test]
    fn test_sparse_mode_without_sparse_vector_is_rejected() {
        let mut query = hybrid_query();
        query.mode = QueryMode::Sparse;
        query.sparse = None;
        assert!(layout().request(&query).is_err());
    }

    #[test]
    fn test_node_text_from_plain_payload() {
        let point = ScoredPoint {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Num(42)),
            }),
            score: 0.5,
            payload: HashMap::from([
                ("text".to_string(), string_value("chunk")),
                ("document_metadata_id".to_string(), string_value("doc1")),
            ]),
            ..Default::default()
        };
        let node = into_node(point);
        assert_eq!(node.id, "42");
        assert_eq!(node.text, "chunk");
        assert_eq!(node.metadata["document_metadata_id"], "doc1");
        assert!(!node.metadata.contains_key("text"));
    }

    #[test]
    fn test_node_text_from_serialized_node_content() {
        let content = json!({ "text": "serialized chunk", "id_": "n1" }).to_string();
        let point = ScoredPoint {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Uuid("8a2f-uuid".to_string())),
            }),
            score: 0.9,
            payload: HashMap::from([
                ("_node_content".to_string(), string_value(&content)),
                ("document_metadata_id".to_string(), string_value("doc1")),
            ]),
            ..Default::default()
        };
        let node = into_node(point);
        assert_eq!(node.id, "8a2f-uuid");
        assert_eq!(node.text, "serialized chunk");
        assert!(!node.metadata.contains_key("_node_content"));
    }

    #[test]
    fn test_nested_payload_values_convert_to_json() {
        let nested = QdrantValue {
            kind: Some(Kind::ListValue(qdrant_client::qdrant::ListValue {
                values: vec![
                    QdrantValue {
                        kind: Some(Kind::IntegerValue(3)),
                    },
                    QdrantValue {
                        kind: Some(Kind::BoolValue(true)),
                    },
                ],
            })),
        };
        assert_eq!(to_json(nested), json!([3, true]));
    }
}
