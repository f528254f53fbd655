//! QueryPlan Common Library
//!
//! Shared code for the query planner service including:
//! - Query planning workflow (plan, execute, aggregate, decide)
//! - Per-document query engines and tools
//! - Hybrid vector retrieval (Qdrant, in-memory)
//! - LLM and embedding client abstractions
//! - Chat response schema
//! - Error types, configuration, metrics

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retrieval;
pub mod schema;
pub mod workflow;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use engine::{create_engine, EngineDeps, Tool};
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use retrieval::VectorStore;
pub use schema::ChatResponse;
pub use workflow::{QueryPlanningWorkflow, WorkflowEvent};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
