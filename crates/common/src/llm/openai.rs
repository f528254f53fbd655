//! OpenAI-compatible chat completions client

use super::{LanguageModel, OutputSchema};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Chat completions client for OpenAI and compatible servers
pub struct OpenAiChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiChatModel {
    /// Create a new chat model client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn build_request<'a>(
        &'a self,
        prompt: &'a str,
        schema: Option<&OutputSchema>,
    ) -> ChatRequest<'a> {
        let response_format = schema.map(|s| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": s.name,
                    "schema": s.schema,
                    "strict": true
                }
            })
        });

        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format,
        }
    }

    /// Call the chat completions API
    async fn call_llm(&self, prompt: &str, schema: Option<&OutputSchema>) -> Result<String> {
        let request = self.build_request(prompt, schema);

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| AppError::LlmError {
            message: format!("LLM API request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LlmError {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::LlmError {
            message: format!("Failed to parse LLM response: {}", e),
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LlmError {
                message: "Empty response from LLM".to_string(),
            })
    }

    async fn timed_call(
        &self,
        prompt: &str,
        schema: Option<&OutputSchema>,
        kind: &str,
    ) -> Result<String> {
        let start = Instant::now();
        let result = self.call_llm(prompt, schema).await;
        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            &self.config.model,
            kind,
            result.is_ok(),
        );
        result
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn predict(&self, prompt: &str) -> Result<String> {
        self.timed_call(prompt, None, "predict").await
    }

    async fn predict_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let content = self.timed_call(prompt, Some(schema), "structured").await?;

        serde_json::from_str(strip_code_fence(&content)).map_err(|e| AppError::LlmError {
            message: format!("Structured output was not valid JSON: {}", e),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Some compatible servers wrap JSON output in a markdown fence
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_schema() {
        let model = OpenAiChatModel::new(&LlmConfig::default()).unwrap();
        let request = model.build_request("Hello", None);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert!(json.get("response_format").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_request_with_schema() {
        let model = OpenAiChatModel::new(&LlmConfig::default()).unwrap();
        let schema = OutputSchema {
            name: "QueryPlan",
            schema: serde_json::json!({ "type": "object" }),
        };
        let request = model.build_request("Plan", Some(&schema));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["name"], "QueryPlan");
        assert_eq!(json["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = LlmConfig {
            api_base: "http://localhost:11434/v1/".to_string(),
            ..LlmConfig::default()
        };
        let model = OpenAiChatModel::new(&config).unwrap();
        assert_eq!(model.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"items\": []}"), "{\"items\": []}");
        assert_eq!(strip_code_fence("```json\n{\"items\": []}\n```"), "{\"items\": []}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }
}
