//! Retrieve-then-synthesize query engine

use super::ResponseSynthesizer;
use crate::embeddings::Embedder;
use crate::errors::Result;
use crate::retrieval::{
    MetadataFilters, QueryMode, RetrievedNode, SparseEncoder, VectorStore, VectorStoreQuery,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Answer plus the records it was synthesized from
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub response: String,
    pub source_nodes: Vec<RetrievedNode>,
}

/// Query engine scoped by a fixed set of metadata filters
pub struct QueryEngine {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    sparse_encoder: Arc<dyn SparseEncoder>,
    synthesizer: ResponseSynthesizer,
    filters: MetadataFilters,
    similarity_top_k: usize,
    sparse_top_k: usize,
    mode: QueryMode,
}

impl QueryEngine {
    pub fn builder(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        sparse_encoder: Arc<dyn SparseEncoder>,
        synthesizer: ResponseSynthesizer,
    ) -> QueryEngineBuilder {
        QueryEngineBuilder {
            engine: QueryEngine {
                vector_store,
                embedder,
                sparse_encoder,
                synthesizer,
                filters: MetadataFilters::default(),
                similarity_top_k: 100,
                sparse_top_k: 20,
                mode: QueryMode::Hybrid,
            },
        }
    }

    /// Build the store query for `text`
    async fn build_query(&self, text: &str) -> Result<VectorStoreQuery> {
        let dense = match self.mode {
            QueryMode::Default | QueryMode::Hybrid => Some(self.embedder.embed(text).await?),
            QueryMode::Sparse => None,
        };
        let sparse = match self.mode {
            QueryMode::Sparse | QueryMode::Hybrid => Some(self.sparse_encoder.encode(text)),
            QueryMode::Default => None,
        };

        Ok(VectorStoreQuery {
            dense,
            sparse,
            similarity_top_k: self.similarity_top_k,
            sparse_top_k: self.sparse_top_k,
            filters: self.filters.clone(),
            mode: self.mode,
        })
    }

    #[instrument(skip(self), fields(store = self.vector_store.name()))]
    pub async fn query(&self, text: &str) -> Result<EngineResponse> {
        let query = self.build_query(text).await?;
        let nodes = self.vector_store.query(&query).await?;
        debug!(retrieved = nodes.len(), "Retrieved context");

        let response = self.synthesizer.synthesize(text, &nodes).await?;

        Ok(EngineResponse {
            response,
            source_nodes: nodes,
        })
    }
}

pub struct QueryEngineBuilder {
    engine: QueryEngine,
}

impl QueryEngineBuilder {
    pub fn filters(mut self, filters: MetadataFilters) -> Self {
        self.engine.filters = filters;
        self
    }

    pub fn similarity_top_k(mut self, k: usize) -> Self {
        self.engine.similarity_top_k = k;
        self
    }

    pub fn sparse_top_k(mut self, k: usize) -> Self {
        self.engine.sparse_top_k = k;
        self
    }

    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.engine.mode = mode;
        self
    }

    pub fn build(self) -> QueryEngine {
        self.engine
    }
}
