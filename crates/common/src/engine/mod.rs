//! Per-document query engine and the tools built on it
//!
//! `create_engine` is called once per request: it scopes retrieval to one
//! document and wraps the resulting engine as the single planner tool.

mod query_engine;
mod synthesizer;
mod tool;

pub use query_engine::{EngineResponse, QueryEngine, QueryEngineBuilder};
pub use synthesizer::{ResponseSynthesizer, EMPTY_RESPONSE};
pub use tool::{QueryEngineTool, Tool, ToolMetadata, ToolOutput};

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::llm::LanguageModel;
use crate::retrieval::{MetadataFilter, MetadataFilters, QueryMode, SparseEncoder, VectorStore};
use std::sync::Arc;

/// Shared handles a query engine is built from
#[derive(Clone)]
pub struct EngineDeps {
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub sparse_encoder: Arc<dyn SparseEncoder>,
    pub llm: Arc<dyn LanguageModel>,
    pub retrieval: RetrievalConfig,
}

/// Build the planner tools for one document
pub fn create_engine(doc_id: &str, deps: &EngineDeps) -> Vec<Arc<dyn Tool>> {
    let filters = MetadataFilters::new(vec![MetadataFilter::exact_match(
        deps.retrieval.filter_key.clone(),
        doc_id,
    )]);

    let engine = QueryEngine::builder(
        deps.vector_store.clone(),
        deps.embedder.clone(),
        deps.sparse_encoder.clone(),
        ResponseSynthesizer::new(deps.llm.clone()),
    )
    .filters(filters)
    .similarity_top_k(deps.retrieval.similarity_top_k)
    .sparse_top_k(deps.retrieval.sparse_top_k)
    .mode(QueryMode::Hybrid)
    .build();

    vec![Arc::new(QueryEngineTool::new(
        engine,
        deps.retrieval.tool_name.clone(),
        deps.retrieval.tool_description.clone(),
    ))]
}
