//! Execution error types and the coordinator termination values.
//!
//! Every executional failure is funneled through
//! [`ExecutionError`]; the coordinator routes it to the user `error`
//! callback and translates the returned directive into a
//! [`TerminationReason`] or a retry.

use thiserror::Error;

/// Classification of an execution error by origin.
///
/// - `External`: originated outside the core (LLM call, memory backend,
///   tool exception). Retryable by user policy.
/// - `Framework`: an internal invariant was broken (missing worker,
///   missing node details, planner stall).
/// - `Invalid`: validation failure (schema mismatch, bad config, bad
///   message format).
/// - `Unknown`: uncategorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    External,
    Framework,
    Invalid,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::External => "external",
            Self::Framework => "framework",
            Self::Invalid => "invalid",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An execution error observed while running an agent.
///
/// Returned by stage workers via `stage_response(err)` and raised by the
/// coordinator itself (e.g. planner stalls). Never crosses a task
/// boundary as a panic; the error value is the only propagation channel.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// A stage execution failed; `cause` is the underlying reason.
    #[error("stage '{stage}' failed: {cause}")]
    Stage { stage: String, cause: String, kind: ErrorKind },

    /// The planner found unfinished nodes but none ready to run.
    #[error("no nodes ready: {unfinished} unfinished stage(s) with unmet dependencies")]
    NoNodesReady { unfinished: usize },

    /// No worker is registered for a stage selected for dispatch.
    #[error("no worker for stage '{0}'")]
    MissingWorker(String),

    /// A user callback panicked or failed inside the mediator.
    #[error("callback '{hook}' failed: {cause}")]
    Callback { hook: &'static str, cause: String },

    /// The LLM-tool interaction loop exceeded its round budget.
    #[error("max tool iterations reached ({0})")]
    MaxToolIterations(u32),

    /// The LLM client returned an error.
    #[error("llm call failed: {0}")]
    Llm(String),
}

impl ExecutionError {
    /// Returns the taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stage { kind, .. } => *kind,
            Self::NoNodesReady { .. } | Self::MissingWorker(_) | Self::Callback { .. } => {
                ErrorKind::Framework
            }
            Self::MaxToolIterations(_) => ErrorKind::External,
            Self::Llm(_) => ErrorKind::External,
        }
    }

    /// Wraps an arbitrary cause as a stage failure of the given kind.
    pub fn stage(stage: impl Into<String>, cause: impl ToString, kind: ErrorKind) -> Self {
        Self::Stage {
            stage: stage.into(),
            cause: cause.to_string(),
            kind,
        }
    }
}

/// Why a coordinator stopped.
///
/// Surfaced by the synchronous API as the `{error, reason}` value and
/// logged in the final teardown event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// All stages completed (stateless agents stop here).
    Completed,
    /// The user `error` callback asked to stop.
    AgentStopped(String),
    /// The user `error` callback asked for a restart; the supervisor
    /// owning this agent decides whether to start a fresh coordinator.
    RestartRequested(String),
    /// The `error` callback returned something other than a directive.
    UnexpectedHandleErrorResponse(String),
    /// The `error` callback itself failed.
    ErrorCallbackFailed(String),
    /// Explicit stop via the public API.
    Stopped,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::AgentStopped(r) => write!(f, "agent stopped execution: {}", r),
            Self::RestartRequested(r) => write!(f, "restart requested: {}", r),
            Self::UnexpectedHandleErrorResponse(v) => {
                write!(f, "unexpected handle_error response: {}", v)
            }
            Self::ErrorCallbackFailed(c) => write!(f, "error callback failed: {}", c),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
