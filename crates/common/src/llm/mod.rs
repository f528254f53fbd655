//! LLM client abstraction
//!
//! Two call shapes are used by the planner:
//! - free-text prediction (decisions, answer synthesis)
//! - structured prediction against a JSON schema (query plans)

mod openai;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use openai::OpenAiChatModel;

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// JSON schema handed to the provider for structured output
#[derive(Debug, Clone)]
pub struct OutputSchema {
    /// Schema name (provider-visible identifier)
    pub name: &'static str,

    /// JSON schema document
    pub schema: serde_json::Value,
}

/// Types that can be produced by structured prediction
pub trait StructuredOutput: DeserializeOwned {
    fn output_schema() -> OutputSchema;
}

/// Trait for LLM providers
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-text completion of a single prompt
    async fn predict(&self, prompt: &str) -> Result<String>;

    /// Completion constrained to `schema`; returns the parsed JSON document
    async fn predict_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Predict a typed object from a prompt
pub async fn structured_predict<T: StructuredOutput>(
    llm: &dyn LanguageModel,
    prompt: &str,
) -> Result<T> {
    let schema = T::output_schema();
    let value = llm.predict_structured(prompt, &schema).await?;

    serde_json::from_value(value).map_err(|e| AppError::LlmError {
        message: format!("Output did not match schema {}: {}", schema.name, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Verdict {
        answer: String,
    }

    impl StructuredOutput for Verdict {
        fn output_schema() -> OutputSchema {
            OutputSchema {
                name: "Verdict",
                schema: serde_json::json!({
                    "type": "object",
                    "properties": { "answer": { "type": "string" } },
                    "required": ["answer"],
                    "additionalProperties": false
                }),
            }
        }
    }

    struct FixedJson(serde_json::Value);

    #[async_trait]
    impl LanguageModel for FixedJson {
        async fn predict(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        async fn predict_structured(
            &self,
            _prompt: &str,
            _schema: &OutputSchema,
        ) -> Result<serde_json::Value> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_structured_predict_parses() {
        let llm = FixedJson(serde_json::json!({ "answer": "yes" }));
        let verdict: Verdict = structured_predict(&llm, "Is it?").await.unwrap();
        assert_eq!(verdict.answer, "yes");
    }

    #[tokio::test]
    async fn test_structured_predict_schema_mismatch() {
        let llm = FixedJson(serde_json::json!({ "verdict": 1 }));
        let err = structured_predict::<Verdict>(&llm, "Is it?").await.unwrap_err();
        assert!(matches!(err, AppError::LlmError { .. }));
        assert!(err.to_string().contains("Verdict"));
    }
}
