//! Configuration management for QueryPlan services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    pub vector_store: VectorStoreConfig,

    /// Retrieval parameters for the per-document query engine
    pub retrieval: RetrievalConfig,

    /// Planning workflow configuration
    pub workflow: WorkflowConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub api_base: String,

    /// API key (optional for local OpenAI-compatible servers)
    pub api_key: Option<String>,

    /// Chat model used for planning, decisions, and synthesis
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum output tokens per completion
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    pub model: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Vector store provider: qdrant, memory
    pub provider: String,

    /// Qdrant gRPC endpoint
    pub url: String,

    /// Qdrant API key
    pub api_key: Option<String>,

    /// Collection holding the document chunks
    pub collection: String,

    /// Named dense vector in the collection
    pub dense_vector_name: String,

    /// Named sparse vector in the collection
    pub sparse_vector_name: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// JSON file of `{text, metadata}` records loaded into the memory provider at startup
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Dense candidates (and final hybrid result size)
    pub similarity_top_k: usize,

    /// Sparse candidates
    pub sparse_top_k: usize,

    /// Metadata key the per-request document filter applies to
    pub filter_key: String,

    /// Name the query tool is registered under
    pub tool_name: String,

    /// Description advertised to the planner
    pub tool_description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// End-to-end timeout for one workflow run in seconds
    pub timeout_secs: u64,

    /// Concurrent plan item executions
    pub num_workers: usize,

    /// Maximum planning rounds (0 = unbounded, timeout only)
    pub max_rounds: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,

    /// Service name for logs
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            api_base: None,
            model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
            timeout_secs: 30,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: "qdrant".to_string(),
            url: "http://localhost:6334".to_string(),
            api_key: None,
            collection: "documents".to_string(),
            dense_vector_name: "text-dense".to_string(),
            sparse_vector_name: "text-sparse".to_string(),
            timeout_secs: 30,
            seed_path: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: 100,
            sparse_top_k: 20,
            filter_key: "document_metadata_id".to_string(),
            tool_name: "workflows_tool".to_string(),
            tool_description: String::new(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 200,
            num_workers: 4,
            max_rounds: 10,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: true,
            metrics_port: 9090,
            service_name: "queryplan".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Socket address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WorkflowConfig {
    /// End-to-end run timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
    }

    #[test]
    fn test_reference_retrieval_and_workflow_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.similarity_top_k, 100);
        assert_eq!(config.retrieval.sparse_top_k, 20);
        assert_eq!(config.retrieval.filter_key, "document_metadata_id");
        assert_eq!(config.retrieval.tool_name, "workflows_tool");
        assert_eq!(config.workflow.num_workers, 4);
        assert_eq!(config.workflow.timeout(), Duration::from_secs(200));
    }

    #[test]
    fn test_checked_in_defaults_match_code_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                include_str!("../../../../config/default.toml"),
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.vector_store.url, defaults.vector_store.url);
        assert_eq!(config.vector_store.collection, defaults.vector_store.collection);
        assert_eq!(config.retrieval.similarity_top_k, defaults.retrieval.similarity_top_k);
        assert_eq!(config.retrieval.sparse_top_k, defaults.retrieval.sparse_top_k);
        assert_eq!(config.retrieval.tool_name, defaults.retrieval.tool_name);
        assert_eq!(config.workflow.timeout_secs, defaults.workflow.timeout_secs);
        assert_eq!(config.workflow.num_workers, defaults.workflow.num_workers);
        assert_eq!(config.workflow.max_rounds, defaults.workflow.max_rounds);
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "workflow": { "max_rounds": 3 },
            "vector_store": { "provider": "memory" }
        }))
        .unwrap();
        assert_eq!(config.workflow.max_rounds, 3);
        assert_eq!(config.workflow.num_workers, 4);
        assert_eq!(config.vector_store.provider, "memory");
        assert_eq!(config.vector_store.dense_vector_name, "text-dense");
    }
}
