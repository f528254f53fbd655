//! Named, callable tools the planner dispatches plan items to

use super::QueryEngine;
use crate::errors::Result;
use crate::retrieval::RetrievedNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool identity advertised to the planner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

/// Result of one tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Answer text
    pub content: String,

    /// Name of the tool that produced it
    pub tool_name: String,

    /// Input the tool was called with
    pub raw_input: String,

    /// Retrieved records the answer was synthesized from
    pub sources: Vec<RetrievedNode>,
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    async fn call(&self, input: &str) -> Result<ToolOutput>;
}

/// Tool answering natural-language queries through a [`QueryEngine`]
pub struct QueryEngineTool {
    engine: QueryEngine,
    metadata: ToolMetadata,
}

impl QueryEngineTool {
    pub fn new(engine: QueryEngine, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            engine,
            metadata: ToolMetadata {
                name: name.into(),
                description: description.into(),
            },
        }
    }
}

#[async_trait]
impl Tool for QueryEngineTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn call(&self, input: &str) -> Result<ToolOutput> {
        let response = self.engine.query(input).await?;

        Ok(ToolOutput {
            content: response.response,
            tool_name: self.metadata.name.clone(),
            raw_input: input.to_string(),
            sources: response.source_nodes,
        })
    }
}
