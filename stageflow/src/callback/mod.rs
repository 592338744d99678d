//! Lifecycle callbacks: the extension surface of an agent.
//!
//! Every extension point is a named operation with a fixed signature on
//! [`AgentCallbacks`]; there is no dynamic mixin mechanism. The
//! [`StateManager`] mediator invokes the hooks, normalizes their return
//! shapes, and isolates faults so a panicking callback can never corrupt
//! coordinator state.
//!
//! Default implementations pass the state through unchanged, `plan`
//! executes every ready node, and `error` stops the agent.

mod state_manager;

pub use state_manager::StateManager;
pub(crate) use state_manager::panic_message;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::dag::Dag;
use crate::error::ExecutionError;
use crate::runtime::ProgressInfo;
use crate::spec::Stage;
use crate::state::AgentState;
use crate::tool::ToolError;

/// Normalized outcome of a state-bearing callback.
///
/// `Continue` adopts the returned state; `Override` adopts the embedded
/// override (an explicit "replace whatever you had"); anything that is
/// neither — [`CallbackOutcome::Unchanged`] — retains the prior state.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    Continue(AgentState),
    Override(AgentState),
    Unchanged,
}

/// Outcome of the `plan` callback: optionally filter the ready set.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    /// Execute exactly these nodes (a subset of the ready set) with the
    /// returned state.
    Planned {
        nodes: Vec<String>,
        state: AgentState,
    },
    /// Fall back to the full ready set and the prior state.
    Unchanged,
}

/// Decision of the `error` callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDirective {
    /// Reset the batch, keep committed results, and replan with this state.
    Retry(AgentState),
    /// Stop the agent with the given reason.
    Stop(String),
    /// Stop and ask the owning supervisor for a restart.
    Restart(String),
}

/// Agent lifecycle callbacks.
///
/// Coordinator-side hooks: `init`, `plan`, `batch_start`, `stage_finish`,
/// `progress`, `batch_complete`, `complete`, `error`. Worker-side hooks:
/// `stage_start`, `tool_call`, `tool_result`.
///
/// Implementations are registered in the
/// [`Registry`](crate::registry::Registry) and referenced by
/// `AgentSpec::callback_module`.
#[async_trait]
pub trait AgentCallbacks: Send + Sync {
    /// Called once after the DAG is built, before the first plan.
    async fn init(&self, _dag: &Dag, state: AgentState) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Called each planning round with the ready node names; may filter
    /// the set.
    async fn plan(&self, ready: &[String], state: AgentState) -> PlanOutcome {
        PlanOutcome::Planned {
            nodes: ready.to_vec(),
            state,
        }
    }

    /// Called before a batch is dispatched.
    async fn batch_start(&self, _nodes: &[String], state: AgentState) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Worker-side: called before a stage's interaction loop starts.
    async fn stage_start(&self, _stage: &Stage, state: AgentState) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Called after each stage completion, in arrival order.
    async fn stage_finish(
        &self,
        _stage: &Stage,
        _result: &Value,
        state: AgentState,
    ) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Called after each stage completion with updated progress.
    async fn progress(&self, _info: &ProgressInfo, state: AgentState) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Called exactly once when a batch's pending set drains.
    async fn batch_complete(
        &self,
        _batch_results: &HashMap<String, Value>,
        _pending: &[String],
        state: AgentState,
    ) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Called once when every stage of the run has completed.
    async fn complete(
        &self,
        _final_results: &HashMap<String, Value>,
        state: AgentState,
    ) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Worker-side: called before a tool executes.
    async fn tool_call(&self, _name: &str, _args: &Value, state: AgentState) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Worker-side: called after a tool executed (or failed).
    async fn tool_result(
        &self,
        _name: &str,
        _outcome: &Result<Value, ToolError>,
        state: AgentState,
    ) -> CallbackOutcome {
        CallbackOutcome::Continue(state)
    }

    /// Called for every executional error; the directive decides the
    /// agent's fate.
    async fn error(&self, error: &ExecutionError, _state: AgentState) -> ErrorDirective {
        ErrorDirective::Stop(error.to_string())
    }
}

/// The all-defaults callback module; useful for agents that need no hooks.
pub struct NoopCallbacks;

#[async_trait]
impl AgentCallbacks for NoopCallbacks {}
