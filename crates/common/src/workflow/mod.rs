//! Query planning workflow
//!
//! One run loops through:
//! - Planning: the LLM produces a `QueryPlan` over the available tools
//! - Executing: plan items run concurrently on a bounded worker pool
//! - Aggregating: results are joined in plan order once every item has answered
//! - Deciding: the LLM either answers or asks for another planning round
//!
//! Progress is published as `WorkflowEvent`s while the run is in flight.

mod barrier;
mod events;
mod plan;
pub mod prompts;

pub use barrier::JoinBarrier;
pub use events::WorkflowEvent;
pub use plan::{ExecutedPlanEvent, QueryPlan, QueryPlanItem, QueryPlanItemResult};

use crate::config::WorkflowConfig;
use crate::engine::Tool;
use crate::errors::{AppError, Result};
use crate::llm::{structured_predict, LanguageModel};
use crate::metrics;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn, Instrument};

type EventSender = mpsc::UnboundedSender<WorkflowEvent>;

/// Immutable per-run state shared with every worker
struct RunContext {
    query: String,
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Tool listing rendered for the planning prompt
    context: String,
    events: EventSender,
}

impl RunContext {
    fn new(query: String, tools: Vec<Arc<dyn Tool>>, events: EventSender) -> Self {
        let context = tools
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{}. {}: {}", i + 1, t.metadata().name, t.metadata().description))
            .collect::<Vec<_>>()
            .join("\n");

        let tools = tools
            .into_iter()
            .map(|t| (t.metadata().name.clone(), t))
            .collect();

        Self {
            query,
            tools,
            context,
            events,
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        info!(event = %event.msg(), "Workflow event");
        // The receiver may be gone if the caller stopped listening
        let _ = self.events.send(event);
    }
}

enum Step {
    Planning,
    Executing(QueryPlan),
    Aggregating(Vec<QueryPlanItemResult>),
    Deciding(ExecutedPlanEvent),
    Done(String),
}

/// Plan → execute → aggregate → decide loop over a set of tools
#[derive(Clone)]
pub struct QueryPlanningWorkflow {
    llm: Arc<dyn LanguageModel>,
    config: WorkflowConfig,
    timeout: Duration,
}

impl QueryPlanningWorkflow {
    pub fn new(llm: Arc<dyn LanguageModel>, config: WorkflowConfig) -> Self {
        let timeout = config.timeout();
        Self {
            llm,
            config,
            timeout,
        }
    }

    /// Override the end-to-end timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a run in the background
    pub fn run(&self, query: impl Into<String>, tools: Vec<Arc<dyn Tool>>) -> WorkflowHandler {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(RunContext::new(query.into(), tools, events_tx));
        let workflow = self.clone();

        let span = tracing::info_span!("workflow", run_id = %uuid::Uuid::new_v4());
        let task = tokio::spawn(
            async move {
                let start = Instant::now();
                let rounds = AtomicUsize::new(0);

                let result = match tokio::time::timeout(
                    workflow.timeout,
                    workflow.run_inner(ctx, &rounds),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AppError::WorkflowTimeout {
                        timeout_ms: workflow.timeout.as_millis() as u64,
                    }),
                };

                let outcome = match &result {
                    Ok(_) => "success",
                    Err(AppError::WorkflowTimeout { .. }) => "timeout",
                    Err(AppError::PlanningExhausted { .. }) => "exhausted",
                    Err(_) => "error",
                };
                let rounds = rounds.load(Ordering::Relaxed);
                metrics::record_workflow(start.elapsed().as_secs_f64(), rounds, outcome);

                match &result {
                    Ok(_) => info!(rounds, "Workflow finished"),
                    Err(e) => warn!(rounds, error = %e, "Workflow failed"),
                }
                result
            }
            .instrument(span),
        );

        WorkflowHandler {
            events: Some(events_rx),
            task: Some(task),
        }
    }

    async fn run_inner(&self, ctx: Arc<RunContext>, rounds: &AtomicUsize) -> Result<String> {
        let barrier = JoinBarrier::new();
        let mut round = 0;
        let mut step = Step::Planning;

        loop {
            step = match step {
                Step::Planning => {
                    round += 1;
                    rounds.store(round, Ordering::Relaxed);

                    let prompt = prompts::planning_prompt(&ctx.context, &ctx.query);
                    let plan: QueryPlan = structured_predict(self.llm.as_ref(), &prompt).await?;
                    debug!(round, items = plan.len(), "Plan received");

                    ctx.emit(WorkflowEvent::Planned {
                        round,
                        plan: plan.clone(),
                    });
                    Step::Executing(plan)
                }
                Step::Executing(plan) => {
                    let results = self.execute_plan(&ctx, &barrier, round, plan).await?;
                    Step::Aggregating(results)
                }
                Step::Aggregating(results) => Step::Deciding(ExecutedPlanEvent::aggregate(&results)),
                Step::Deciding(executed) => {
                    let prompt = prompts::decision_prompt(&ctx.query, &executed.result);
                    let decision = self.llm.predict(&prompt).await?;

                    if !prompts::requests_replan(&decision) {
                        Step::Done(decision)
                    } else if self.config.max_rounds > 0 && round >= self.config.max_rounds {
                        return Err(AppError::PlanningExhausted { rounds: round });
                    } else {
                        debug!(round, "Decision requested re-planning");
                        Step::Planning
                    }
                }
                Step::Done(answer) => return Ok(answer),
            };
        }
    }

    /// Run every plan item and return results in plan order
    async fn execute_plan(
        &self,
        ctx: &Arc<RunContext>,
        barrier: &JoinBarrier<QueryPlanItemResult>,
        round: usize,
        plan: QueryPlan,
    ) -> Result<Vec<QueryPlanItemResult>> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        barrier.open(round, plan.len())?;

        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let (results_tx, mut results_rx) = mpsc::channel(plan.len());
        let mut workers = JoinSet::new();

        for (index, item) in plan.items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let ctx = ctx.clone();
            let results_tx = results_tx.clone();

            workers.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let result = execute_item(&ctx, item).await;
                let _ = results_tx.send((round, index, result)).await;
            });
        }
        drop(results_tx);

        while let Some((item_round, index, result)) = results_rx.recv().await {
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    barrier.close(round)?;
                    return Err(e);
                }
            };

            if let Some(results) = barrier.collect(item_round, index, result)? {
                return Ok(results);
            }
        }

        barrier.close(round)?;
        Err(AppError::Internal {
            message: format!("Workers for round {} stopped before all results arrived", round),
        })
    }
}

async fn execute_item(ctx: &RunContext, item: QueryPlanItem) -> Result<QueryPlanItemResult> {
    let tool = ctx
        .tools
        .get(&item.name)
        .ok_or_else(|| AppError::UnknownTool {
            name: item.name.clone(),
        })?;
    let tool_name = tool.metadata().name.clone();

    ctx.emit(WorkflowEvent::ToolQueried {
        tool: tool_name.clone(),
        query: item.query.clone(),
    });

    let start = Instant::now();
    let output = tool.call(&item.query).await;
    metrics::record_tool_call(start.elapsed().as_secs_f64(), &tool_name, output.is_ok());
    let output = output?;

    ctx.emit(WorkflowEvent::ToolReturned {
        tool: tool_name,
        result: output.to_string(),
    });

    Ok(QueryPlanItemResult {
        query: item.query,
        result: output.to_string(),
    })
}

/// Handle to a running workflow
///
/// Dropping the handler cancels the run.
pub struct WorkflowHandler {
    events: Option<mpsc::UnboundedReceiver<WorkflowEvent>>,
    task: Option<JoinHandle<Result<String>>>,
}

impl WorkflowHandler {
    /// Events in emission order; ends when the run finishes.
    ///
    /// The stream can be taken once; later calls return an empty stream.
    pub fn stream_events(&mut self) -> BoxStream<'static, WorkflowEvent> {
        match self.events.take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    /// Wait for the final answer
    pub async fn result(mut self) -> Result<String> {
        let task = self.task.take().ok_or_else(|| AppError::Internal {
            message: "Workflow result already taken".to_string(),
        })?;

        task.await.map_err(|e| AppError::Internal {
            message: format!("Workflow task failed: {}", e),
        })?
    }
}

impl Drop for WorkflowHandler {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
