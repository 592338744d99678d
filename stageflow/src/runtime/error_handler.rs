//! Central error policy: translate an execution error into retry or a
//! termination value.
//!
//! Every executional error funnels through here. The user's `error`
//! callback (fault-isolated by the mediator) decides the agent's fate;
//! a failing callback terminates the agent with `ErrorCallbackFailed`.

use tracing::{info, warn};

use crate::callback::{ErrorDirective, StateManager};
use crate::error::{ExecutionError, TerminationReason};
use crate::state::AgentState;

/// What the coordinator should do with a failed execution step.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDisposition {
    /// Reset batch and planned nodes, keep committed results, replan with
    /// this state.
    Retry(AgentState),
    /// Stop the coordinator with this reason.
    Terminate(TerminationReason),
}

/// Routes `error` through the user callback and maps the directive.
pub async fn handle_execution_error(
    state_manager: &StateManager,
    error: &ExecutionError,
    state: &AgentState,
) -> ErrorDisposition {
    warn!(error = %error, kind = %error.kind(), "execution error");
    match state_manager.error(error, state).await {
        Ok(ErrorDirective::Retry(next_state)) => {
            info!("error callback requested retry");
            ErrorDisposition::Retry(next_state)
        }
        Ok(ErrorDirective::Stop(reason)) => {
            ErrorDisposition::Terminate(TerminationReason::AgentStopped(reason))
        }
        Ok(ErrorDirective::Restart(reason)) => {
            ErrorDisposition::Terminate(TerminationReason::RestartRequested(reason))
        }
        Err(callback_error) => ErrorDisposition::Terminate(TerminationReason::ErrorCallbackFailed(
            callback_error.to_string(),
        )),
    }
}
