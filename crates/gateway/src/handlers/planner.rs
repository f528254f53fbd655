//! Query planner handlers
//!
//! Both endpoints build a document-scoped engine and a workflow run per request.
//! `/query_planner` returns the concatenated status messages once the run ends;
//! `/query_planner/stream` relays them as Server-Sent Events while it runs.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use queryplan_common::{
    create_engine,
    errors::{AppError, Result},
    metrics::RequestMetrics,
    schema::{ChatResponse, MessageType, Sender},
    workflow::WorkflowHandler,
};

/// Raw query string; absent keys are reported individually
#[derive(Debug, Deserialize)]
pub struct RawPlannerParams {
    doc_id: Option<String>,
    query_id: Option<String>,
    query: Option<String>,
}

/// Query string of both planner endpoints
#[derive(Debug, Validate)]
pub struct QueryPlannerParams {
    /// Document the retrieval is scoped to
    #[validate(length(min = 1, message = "doc_id must not be empty"))]
    pub doc_id: String,

    /// Client correlation id, echoed in every envelope
    #[validate(length(min = 1, message = "query_id must not be empty"))]
    pub query_id: String,

    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| AppError::MissingField {
        field: field.to_string(),
    })
}

fn parse_params(
    raw: std::result::Result<Query<RawPlannerParams>, QueryRejection>,
) -> Result<QueryPlannerParams> {
    let Query(raw) = raw.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let params = QueryPlannerParams {
        doc_id: required(raw.doc_id, "doc_id")?,
        query_id: required(raw.query_id, "query_id")?,
        query: required(raw.query, "query")?,
    };

    params.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    Ok(params)
}

/// Builds the envelopes for one request
#[derive(Clone)]
struct Envelopes {
    query_id: String,
    doc_id: String,
}

impl Envelopes {
    fn new(params: &QueryPlannerParams) -> Self {
        Self {
            query_id: params.query_id.clone(),
            doc_id: params.doc_id.clone(),
        }
    }

    fn base(&self, sender: Sender, message: impl Into<String>, kind: MessageType) -> ChatResponse {
        ChatResponse::with_sender(sender, message)
            .message_type(kind)
            .query_id(self.query_id.clone())
            .message_id(self.doc_id.clone())
    }

    fn start(&self) -> ChatResponse {
        self.base(Sender::Assistant, "", MessageType::Start)
            .prediction_count("")
            .chat_type("planner agent")
    }

    fn stream(&self, msg: String) -> ChatResponse {
        self.base(Sender::Assistant, msg, MessageType::Stream)
            .chat_type("planner agent")
    }

    fn response(&self, answer: String) -> ChatResponse {
        self.base(Sender::Assistant, answer, MessageType::Response)
            .chat_type("planner agent")
    }

    fn error(&self, err: &AppError) -> ChatResponse {
        self.base(Sender::AssistantError, err.to_string(), MessageType::Error)
            .chat_type("planner agent")
    }

    fn end(&self) -> ChatResponse {
        self.base(Sender::Assistant, "", MessageType::End)
            .prediction_count("")
            .chat_type("default")
            .last_event(true)
    }
}

fn start_run(state: &AppState, params: &QueryPlannerParams) -> WorkflowHandler {
    let tools = create_engine(&params.doc_id, &state.deps);
    state.workflow.run(params.query.clone(), tools)
}

/// Run the planner and return every status message concatenated
pub async fn run_query_planner(
    State(state): State<AppState>,
    params: std::result::Result<Query<RawPlannerParams>, QueryRejection>,
) -> Result<String> {
    let metrics = RequestMetrics::start("POST", "/query_planner");
    let start = Instant::now();

    let result = relay_to_text(&state, params).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    metrics.finish(status);

    tracing::info!(
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "Query planner request completed"
    );
    result
}

async fn relay_to_text(
    state: &AppState,
    params: std::result::Result<Query<RawPlannerParams>, QueryRejection>,
) -> Result<String> {
    let params = parse_params(params)?;
    let envelopes = Envelopes::new(&params);

    tracing::info!(
        doc_id = %params.doc_id,
        query_id = %params.query_id,
        "Starting query planner"
    );

    let mut handler = start_run(state, &params);
    tracing::debug!(envelope = ?envelopes.start(), "Relay start");

    let mut events = String::new();
    let mut stream = handler.stream_events();
    while let Some(event) = stream.next().await {
        let msg = event.msg();
        events.push_str(&msg);
        tracing::debug!(envelope = ?envelopes.stream(msg), "Relay event");
    }

    let answer = handler.result().await?;
    tracing::debug!(answer_len = answer.len(), envelope = ?envelopes.end(), "Relay end");

    Ok(events)
}

/// Run the planner and stream `ChatResponse` envelopes as Server-Sent Events
pub async fn stream_query_planner(
    State(state): State<AppState>,
    params: std::result::Result<Query<RawPlannerParams>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    let metrics = RequestMetrics::start("POST", "/query_planner/stream");
    let params = match parse_params(params) {
        Ok(params) => params,
        Err(e) => {
            metrics.finish(e.status_code().as_u16());
            return Err(e);
        }
    };
    let envelopes = Envelopes::new(&params);

    tracing::info!(
        doc_id = %params.doc_id,
        query_id = %params.query_id,
        "Starting streaming query planner"
    );

    let mut handler = start_run(&state, &params);
    let events = handler.stream_events();

    let head = stream::once(futures::future::ready(envelopes.start()));

    let body = {
        let envelopes = envelopes.clone();
        events.map(move |event| envelopes.stream(event.msg()))
    };

    let tail = stream::once(async move {
        let (final_envelope, status) = match handler.result().await {
            Ok(answer) => (envelopes.response(answer), 200),
            Err(e) => {
                tracing::warn!(error = %e, "Streaming query planner failed");
                (envelopes.error(&e), e.status_code().as_u16())
            }
        };
        metrics.finish(status);
        stream::iter([final_envelope, envelopes.end()])
    })
    .flatten();

    let sse_stream = head.chain(body).chain(tail).map(|envelope| {
        let kind = envelope
            .message_type
            .map(|t| t.as_str())
            .unwrap_or("message");
        Event::default().event(kind).json_data(&envelope)
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}
