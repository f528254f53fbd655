//! QueryPlan API Gateway
//!
//! HTTP entry point for the document query planner.
//! Handles:
//! - Query planner requests (buffered text and SSE streaming)
//! - Health and readiness probes
//! - Observability (logging, metrics, request ids)

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use queryplan_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    llm::{LanguageModel, OpenAiChatModel},
    metrics,
    retrieval::{create_vector_store, HashingSparseEncoder, SparseEncoder},
    EngineDeps, QueryPlanningWorkflow,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub deps: EngineDeps,
    pub workflow: QueryPlanningWorkflow,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, deps: EngineDeps) -> Self {
        let workflow = QueryPlanningWorkflow::new(deps.llm.clone(), config.workflow.clone());
        Self {
            config,
            deps,
            workflow,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);

    info!("Starting QueryPlan API Gateway v{}", queryplan_common::VERSION);

    // Initialize metrics
    init_metrics(&config.observability)?;
    metrics::register_metrics();

    let deps = build_deps(&config).await?;
    info!(
        vector_store = deps.vector_store.name(),
        embedder = deps.embedder.model_name(),
        llm = deps.llm.model_name(),
        "Dependencies ready"
    );

    let state = AppState::new(config.clone(), deps);
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_workflow_duration_seconds", metrics::METRICS_PREFIX)),
            metrics::WORKFLOW_BUCKETS,
        )?
        .install()?;

    info!(port = config.metrics_port, "Prometheus exporter listening");
    Ok(())
}

/// Build the shared clients every request's engine is assembled from
async fn build_deps(config: &AppConfig) -> queryplan_common::Result<EngineDeps> {
    let embedder = create_embedder(&config.embedding)?;
    let sparse_encoder: Arc<dyn SparseEncoder> = Arc::new(HashingSparseEncoder::default());
    let vector_store =
        create_vector_store(&config.vector_store, embedder.clone(), sparse_encoder.clone()).await?;
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(&config.llm)?);

    Ok(EngineDeps {
        vector_store,
        embedder,
        sparse_encoder,
        llm,
        retrieval: config.retrieval.clone(),
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Planner endpoints
        .route("/query_planner", post(handlers::planner::run_query_planner))
        .route(
            "/query_planner/stream",
            post(handlers::planner::stream_query_planner),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
