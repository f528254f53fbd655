//! Scripted language model for tests
//!
//! - structured prediction returns the next scripted `QueryPlan` (the last one repeats)
//! - decision prompts return the next scripted decision (`"Done."` once exhausted)
//! - any other prompt is a synthesis call and is echoed back
//! - decisions can be slowed down to stretch a run

use super::{LanguageModel, OutputSchema};
use crate::errors::Result;
use crate::workflow::{prompts::DECISION_PREAMBLE, QueryPlan};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedLlm {
    plans: Vec<QueryPlan>,
    decisions: Mutex<VecDeque<String>>,
    decision_prompts: Mutex<Vec<String>>,
    plan_calls: AtomicUsize,
    decision_calls: AtomicUsize,
    synth_calls: AtomicUsize,
    decision_delay: Duration,
}

impl ScriptedLlm {
    pub fn new<I, S>(plans: Vec<QueryPlan>, decisions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plans,
            decisions: Mutex::new(decisions.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_decision_delay(mut self, delay: Duration) -> Self {
        self.decision_delay = delay;
        self
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    pub fn decision_calls(&self) -> usize {
        self.decision_calls.load(Ordering::SeqCst)
    }

    pub fn synth_calls(&self) -> usize {
        self.synth_calls.load(Ordering::SeqCst)
    }

    /// Decision prompts received so far, in call order
    pub fn decision_prompts(&self) -> Vec<String> {
        self.decision_prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn predict(&self, prompt: &str) -> Result<String> {
        if !prompt.starts_with(DECISION_PREAMBLE) {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(prompt.to_string());
        }

        self.decision_calls.fetch_add(1, Ordering::SeqCst);
        if !self.decision_delay.is_zero() {
            tokio::time::sleep(self.decision_delay).await;
        }
        self.decision_prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        let next = self
            .decisions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(next.unwrap_or_else(|| "Done.".to_string()))
    }

    async fn predict_structured(
        &self,
        _prompt: &str,
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let call = self.plan_calls.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .plans
            .get(call)
            .or_else(|| self.plans.last())
            .cloned()
            .unwrap_or_default();
        Ok(serde_json::to_value(plan)?)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
