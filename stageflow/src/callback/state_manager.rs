//! Callback mediator: invokes user hooks, normalizes return shapes, and
//! isolates faults.
//!
//! Every hook invocation is wrapped: a panic inside user code becomes an
//! [`ExecutionError::Callback`] naming the hook, and the prior state is
//! never corrupted (the mediator works on snapshots).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::dag::Dag;
use crate::error::ExecutionError;
use crate::runtime::ProgressInfo;
use crate::spec::Stage;
use crate::state::AgentState;
use crate::tool::ToolError;

use super::{AgentCallbacks, CallbackOutcome, ErrorDirective, PlanOutcome};

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

/// Mediator between the runtime and the user's [`AgentCallbacks`].
///
/// **Interaction**: One instance per agent, shared between the
/// coordinator (coordinator-side hooks) and every stage worker
/// (worker-side hooks). Cheap to clone.
#[derive(Clone)]
pub struct StateManager {
    callbacks: Arc<dyn AgentCallbacks>,
}

impl StateManager {
    /// Wraps the given callback module.
    pub fn new(callbacks: Arc<dyn AgentCallbacks>) -> Self {
        Self { callbacks }
    }

    /// Runs a hook future with fault isolation.
    async fn guard<T>(
        hook: &'static str,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, ExecutionError> {
        AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
            let cause = panic_message(payload);
            warn!(hook, cause = %cause, "user callback panicked");
            ExecutionError::Callback { hook, cause }
        })
    }

    /// Normalizes an outcome against the prior state.
    fn adopt(prior: &AgentState, outcome: CallbackOutcome) -> AgentState {
        match outcome {
            CallbackOutcome::Continue(state) => state,
            CallbackOutcome::Override(state) => state,
            CallbackOutcome::Unchanged => prior.clone(),
        }
    }

    /// `init(dag, state)` — after DAG construction, before the first plan.
    pub async fn init(&self, dag: &Dag, state: &AgentState) -> Result<AgentState, ExecutionError> {
        let outcome = Self::guard("init", self.callbacks.init(dag, state.clone())).await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `plan(ready, state)` — returns the effective ready set and state.
    ///
    /// A filtering callback constrains execution to a subset of `ready`;
    /// names outside the ready set are dropped with a warning. An
    /// `Unchanged` outcome falls back to the full ready set.
    pub async fn plan(
        &self,
        ready: &[String],
        state: &AgentState,
    ) -> Result<(Vec<String>, AgentState), ExecutionError> {
        let outcome = Self::guard("plan", self.callbacks.plan(ready, state.clone())).await?;
        match outcome {
            PlanOutcome::Planned { nodes, state: next } => {
                let effective: Vec<String> = ready
                    .iter()
                    .filter(|r| nodes.iter().any(|n| n == *r))
                    .cloned()
                    .collect();
                if effective.len() != nodes.len() {
                    warn!(
                        planned = nodes.len(),
                        effective = effective.len(),
                        "plan callback returned nodes outside the ready set; dropped"
                    );
                }
                Ok((effective, next))
            }
            PlanOutcome::Unchanged => Ok((ready.to_vec(), state.clone())),
        }
    }

    /// `batch_start(nodes, state)`.
    pub async fn batch_start(
        &self,
        nodes: &[String],
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome =
            Self::guard("batch_start", self.callbacks.batch_start(nodes, state.clone())).await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `stage_start(stage, state)` — worker-side.
    pub async fn stage_start(
        &self,
        stage: &Stage,
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome =
            Self::guard("stage_start", self.callbacks.stage_start(stage, state.clone())).await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `stage_finish(stage, result, state)`.
    pub async fn stage_finish(
        &self,
        stage: &Stage,
        result: &Value,
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome = Self::guard(
            "stage_finish",
            self.callbacks.stage_finish(stage, result, state.clone()),
        )
        .await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `progress(info, state)`.
    pub async fn progress(
        &self,
        info: &ProgressInfo,
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome =
            Self::guard("progress", self.callbacks.progress(info, state.clone())).await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `batch_complete(batch_results, pending, state)`.
    pub async fn batch_complete(
        &self,
        batch_results: &HashMap<String, Value>,
        pending: &[String],
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome = Self::guard(
            "batch_complete",
            self.callbacks
                .batch_complete(batch_results, pending, state.clone()),
        )
        .await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `complete(final_results, state)`.
    pub async fn complete(
        &self,
        final_results: &HashMap<String, Value>,
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome = Self::guard(
            "complete",
            self.callbacks.complete(final_results, state.clone()),
        )
        .await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `tool_call(name, args, state)` — worker-side.
    pub async fn tool_call(
        &self,
        name: &str,
        args: &Value,
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome =
            Self::guard("tool_call", self.callbacks.tool_call(name, args, state.clone())).await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `tool_result(name, outcome, state)` — worker-side.
    pub async fn tool_result(
        &self,
        name: &str,
        result: &Result<Value, ToolError>,
        state: &AgentState,
    ) -> Result<AgentState, ExecutionError> {
        let outcome = Self::guard(
            "tool_result",
            self.callbacks.tool_result(name, result, state.clone()),
        )
        .await?;
        Ok(Self::adopt(state, outcome))
    }

    /// `error(error, state)` — returns the user's directive.
    pub async fn error(
        &self,
        error: &ExecutionError,
        state: &AgentState,
    ) -> Result<ErrorDirective, ExecutionError> {
        debug!(error = %error, kind = %error.kind(), "invoking error callback");
        Self::guard("error", self.callbacks.error(error, state.clone())).await
    }
}
