//! Failure taxonomy shared by the planner library and the gateway
//!
//! Every fallible path returns [`AppError`]. The gateway turns it into a JSON
//! body carrying a stable [`ErrorCode`]; the streaming endpoint puts the
//! `Display` text into an `error` envelope instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Stable identifiers clients can branch on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // request (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // plan (4xxx)
    UnknownTool,

    // run bounds (5xxx)
    WorkflowTimeout,
    PlanningExhausted,

    // upstream (8xxx)
    LlmError,
    EmbeddingError,
    VectorStoreError,

    // local (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Numeric form, grouped by the ranges above
    pub fn as_code(&self) -> u16 {
        use ErrorCode::*;
        match self {
            ValidationError => 1001,
            MissingField => 1002,
            InvalidFormat => 1003,
            UnknownTool => 4001,
            WorkflowTimeout => 5001,
            PlanningExhausted => 5002,
            LlmError => 8001,
            EmbeddingError => 8002,
            VectorStoreError => 8003,
            InternalError => 9001,
            ConfigurationError => 9002,
            SerializationError => 9003,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid request: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("missing query parameter: {field}")]
    MissingField { field: String },

    #[error("malformed request: {message}")]
    InvalidFormat { message: String },

    /// The planner named a tool that is not registered for this run
    #[error("unknown tool in plan: {name}")]
    UnknownTool { name: String },

    #[error("query planner did not finish within {timeout_ms}ms")]
    WorkflowTimeout { timeout_ms: u64 },

    #[error("no final answer after {rounds} rounds of planning")]
    PlanningExhausted { rounds: usize },

    #[error("language model call failed: {message}")]
    LlmError { message: String },

    #[error("embedding call failed: {message}")]
    EmbeddingError { message: String },

    #[error("vector store call failed: {message}")]
    VectorStoreError { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("bad configuration: {message}")]
    Configuration { message: String },

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::MissingField { .. } => ErrorCode::MissingField,
            Self::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            Self::UnknownTool { .. } => ErrorCode::UnknownTool,
            Self::WorkflowTimeout { .. } => ErrorCode::WorkflowTimeout,
            Self::PlanningExhausted { .. } => ErrorCode::PlanningExhausted,
            Self::LlmError { .. } => ErrorCode::LlmError,
            Self::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            Self::VectorStoreError { .. } => ErrorCode::VectorStoreError,
            Self::Configuration { .. } => ErrorCode::ConfigurationError,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            ErrorCode::ValidationError | ErrorCode::MissingField | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::PlanningExhausted => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::WorkflowTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::LlmError
            | ErrorCode::EmbeddingError
            | ErrorCode::VectorStoreError => StatusCode::BAD_GATEWAY,
            ErrorCode::UnknownTool
            | ErrorCode::InternalError
            | ErrorCode::ConfigurationError
            | ErrorCode::SerializationError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// JSON body returned for a failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let details = match err {
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            AppError::MissingField { field } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        Self {
            error: ErrorDetails {
                code: err.code(),
                message: err.to_string(),
                details,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse::from(&self);

        if self.is_server_error() {
            tracing::error!(
                error = %body.error.message,
                code = ?body.error.code,
                status = status.as_u16(),
                "Request failed"
            );
        } else {
            tracing::warn!(
                error = %body.error.message,
                code = ?body.error.code,
                status = status.as_u16(),
                "Request rejected"
            );
        }

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_is_a_server_fault() {
        let err = AppError::UnknownTool {
            name: "missing_tool".into(),
        };
        assert_eq!(err.code(), ErrorCode::UnknownTool);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("missing_tool"));
    }

    #[test]
    fn request_errors_are_bad_request() {
        let err = AppError::Validation {
            message: "sender must be user, assistant or assistant_error".into(),
            field: Some("sender".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());

        let missing = AppError::MissingField {
            field: "query_id".into(),
        };
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        let body = ErrorResponse::from(&missing);
        assert_eq!(body.error.code, ErrorCode::MissingField);
        assert_eq!(body.error.details, Some(serde_json::json!({ "field": "query_id" })));
    }

    #[test]
    fn upstream_failures_map_to_bad_gateway() {
        let llm = AppError::LlmError {
            message: "503 from provider".into(),
        };
        let store = AppError::VectorStoreError {
            message: "connection refused".into(),
        };
        assert_eq!(llm.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(store.status_code(), StatusCode::BAD_GATEWAY);
        assert!(llm.is_server_error());
    }

    #[test]
    fn run_bounds() {
        let timeout = AppError::WorkflowTimeout {
            timeout_ms: 200_000,
        };
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.code().as_code(), 5001);

        let exhausted = AppError::PlanningExhausted { rounds: 10 };
        assert_eq!(exhausted.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(exhausted.to_string().contains("10 rounds"));
    }

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::PlanningExhausted).unwrap();
        assert_eq!(json, "\"PLANNING_EXHAUSTED\"");
    }
}
