//! Chat response envelope
//!
//! Every event relayed to a client is wrapped in a [`ChatResponse`]. `sender`
//! and `type` are closed sets: unknown labels are rejected both when parsing
//! strings and when deserializing JSON.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format of `message_created`
pub const MESSAGE_CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in [`MESSAGE_CREATED_FORMAT`]
pub fn current_time() -> String {
    chrono::Local::now().format(MESSAGE_CREATED_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    AssistantError,
}

impl Sender {
    pub const ALL: [Sender; 3] = [Sender::User, Sender::Assistant, Sender::AssistantError];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
            Sender::AssistantError => "assistant_error",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| AppError::Validation {
                message: format!("sender must be one of user, assistant, assistant_error; got {:?}", s),
                field: Some("sender".to_string()),
            })
    }
}

/// Event kind carried in `ChatResponse.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Start,
    Stream,
    End,
    Error,
    PageAnalysisResult,
    Info,
    Upgrade,
    SourceDoc,
    SummaryResponse,
    IntermediateResponse,
    PageNumber,
    Language,
    #[serde(rename = "response_1")]
    Response1,
    #[serde(rename = "response_2")]
    Response2,
    ImageResp,
    TextResp,
    LimitExceed,
    RelatedQuestions,
    Assistant,
    ClaudeEnterprise,
    Events,
    IntermediateEvents,
    Response,
}

impl MessageType {
    pub const ALL: [MessageType; 23] = [
        MessageType::Start,
        MessageType::Stream,
        MessageType::End,
        MessageType::Error,
        MessageType::PageAnalysisResult,
        MessageType::Info,
        MessageType::Upgrade,
        MessageType::SourceDoc,
        MessageType::SummaryResponse,
        MessageType::IntermediateResponse,
        MessageType::PageNumber,
        MessageType::Language,
        MessageType::Response1,
        MessageType::Response2,
        MessageType::ImageResp,
        MessageType::TextResp,
        MessageType::LimitExceed,
        MessageType::RelatedQuestions,
        MessageType::Assistant,
        MessageType::ClaudeEnterprise,
        MessageType::Events,
        MessageType::IntermediateEvents,
        MessageType::Response,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Start => "start",
            MessageType::Stream => "stream",
            MessageType::End => "end",
            MessageType::Error => "error",
            MessageType::PageAnalysisResult => "page_analysis_result",
            MessageType::Info => "info",
            MessageType::Upgrade => "upgrade",
            MessageType::SourceDoc => "source_doc",
            MessageType::SummaryResponse => "summary_response",
            MessageType::IntermediateResponse => "intermediate_response",
            MessageType::PageNumber => "page_number",
            MessageType::Language => "language",
            MessageType::Response1 => "response_1",
            MessageType::Response2 => "response_2",
            MessageType::ImageResp => "image_resp",
            MessageType::TextResp => "text_resp",
            MessageType::LimitExceed => "limit_exceed",
            MessageType::RelatedQuestions => "related_questions",
            MessageType::Assistant => "assistant",
            MessageType::ClaudeEnterprise => "claude_enterprise",
            MessageType::Events => "events",
            MessageType::IntermediateEvents => "intermediate_events",
            MessageType::Response => "response",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| AppError::Validation {
                message: format!("unknown message type {:?}", s),
                field: Some("type".to_string()),
            })
    }
}

/// Response envelope for one relayed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub sender: Sender,

    pub message: String,

    #[serde(default)]
    pub analysed_page: Option<String>,

    /// Creation time; filled with the current local time when missing or empty
    #[serde(default = "current_time", deserialize_with = "created_or_now")]
    pub message_created: String,

    #[serde(default)]
    pub image_links: Vec<String>,

    #[serde(default)]
    pub query_id: Option<String>,

    #[serde(default)]
    pub prediction_count: Option<String>,

    #[serde(rename = "type", default)]
    pub message_type: Option<MessageType>,

    #[serde(default)]
    pub top_sources: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default)]
    pub related_question: Option<String>,

    #[serde(default)]
    pub message_id: Option<String>,

    #[serde(default)]
    pub is_last_event: bool,

    #[serde(default)]
    pub event_id: Option<String>,

    #[serde(default)]
    pub metadata_map: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default)]
    pub chat_type: Option<String>,

    #[serde(default)]
    pub code_interpreter_output: bool,

    #[serde(default)]
    pub page_source_mappings: serde_json::Map<String, serde_json::Value>,
}

fn created_or_now<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).unwrap_or_else(current_time))
}

impl ChatResponse {
    /// Create a response with a typed sender
    pub fn with_sender(sender: Sender, message: impl Into<String>) -> Self {
        Self {
            sender,
            message: message.into(),
            analysed_page: None,
            message_created: current_time(),
            image_links: Vec::new(),
            query_id: None,
            prediction_count: None,
            message_type: None,
            top_sources: None,
            related_question: None,
            message_id: None,
            is_last_event: false,
            event_id: None,
            metadata_map: None,
            chat_type: None,
            code_interpreter_output: false,
            page_source_mappings: serde_json::Map::new(),
        }
    }

    /// Create a response from a raw sender label
    pub fn new(sender: &str, message: impl Into<String>) -> Result<Self> {
        Ok(Self::with_sender(sender.parse()?, message))
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn prediction_count(mut self, count: impl Into<String>) -> Self {
        self.prediction_count = Some(count.into());
        self
    }

    pub fn chat_type(mut self, chat_type: impl Into<String>) -> Self {
        self.chat_type = Some(chat_type.into());
        self
    }

    pub fn last_event(mut self, is_last: bool) -> Self {
        self.is_last_event = is_last;
        self
    }
}
