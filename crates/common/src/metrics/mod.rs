//! Metrics and observability utilities
//!
//! Prometheus-style metrics for the planner endpoint, the planning
//! workflow, and the upstream calls it fans out to.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all QueryPlan metrics
pub const METRICS_PREFIX: &str = "queryplan";

/// Histogram buckets for end-to-end workflow latency (in seconds).
/// A run makes several sequential LLM calls, so the range is wide.
pub const WORKFLOW_BUCKETS: &[f64] = &[
    0.5,   // 500ms
    1.0,   // 1s
    2.5,   // 2.5s
    5.0,   // 5s
    10.0,  // 10s
    20.0,  // 20s
    30.0,  // 30s
    60.0,  // 1m
    120.0, // 2m
    200.0, // default workflow timeout
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Workflow metrics
    describe_counter!(
        format!("{}_workflow_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total planning workflow runs by outcome"
    );

    describe_histogram!(
        format!("{}_workflow_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Planning workflow latency in seconds"
    );

    describe_histogram!(
        format!("{}_workflow_rounds", METRICS_PREFIX),
        Unit::Count,
        "Planning rounds per workflow run"
    );

    // Tool metrics
    describe_counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total query tool invocations"
    );

    describe_histogram!(
        format!("{}_tool_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Query tool latency in seconds"
    );

    // Upstream metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM API requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM request latency in seconds"
    );

    describe_counter!(
        format!("{}_vector_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total vector store queries"
    );

    describe_histogram!(
        format!("{}_vector_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector store query latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Helper to record a finished workflow run
pub fn record_workflow(duration_secs: f64, rounds: usize, outcome: &str) {
    counter!(
        format!("{}_workflow_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(format!("{}_workflow_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_workflow_rounds", METRICS_PREFIX)).record(rounds as f64);
}

/// Helper to record a query tool invocation
pub fn record_tool_call(duration_secs: f64, tool: &str, success: bool) {
    counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        "tool" => tool.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    histogram!(
        format!("{}_tool_call_duration_seconds", METRICS_PREFIX),
        "tool" => tool.to_string()
    )
    .record(duration_secs);
}

/// Helper to record LLM metrics; `kind` is one of predict, structured
pub fn record_llm_call(duration_secs: f64, model: &str, kind: &str, success: bool) {
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "kind" => kind.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "kind" => kind.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record vector store metrics
pub fn record_vector_query(duration_secs: f64, store: &str, result_count: usize, success: bool) {
    counter!(
        format!("{}_vector_queries_total", METRICS_PREFIX),
        "store" => store.to_string(),
        "status" => status_label(success)
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_vector_query_duration_seconds", METRICS_PREFIX),
            "store" => store.to_string()
        )
        .record(duration_secs);
        tracing::debug!(store, result_count, "Vector query recorded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_buckets() {
        // Verify buckets are sorted and reach the default workflow timeout
        let mut prev = 0.0;
        for &bucket in WORKFLOW_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        assert_eq!(WORKFLOW_BUCKETS.last(), Some(&200.0));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/query_planner");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without a recorder installed
    }
}
