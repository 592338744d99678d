//! # Stageflow
//!
//! A multi-stage agent execution runtime. A declaratively defined agent —
//! an [`AgentSpec`] of stages with dependencies — is compiled into a DAG;
//! a single-writer coordinator plans ready stages, dispatches batches to
//! per-stage worker tasks, mediates user lifecycle callbacks, routes
//! memory operations across named backends, and recovers from stage
//! failures by user policy (retry / stop / restart).
//!
//! ## Design principles
//!
//! - **Single-writer agent state**: the coordinator owns the canonical
//!   state; workers receive snapshots and return proposed replacements,
//!   adopted in arrival order.
//! - **Callback mediation**: every extension point is a named operation
//!   with a fixed signature on [`AgentCallbacks`]; the [`StateManager`]
//!   mediator normalizes return shapes and isolates faults.
//! - **Capabilities at the seams**: concrete LLM providers, tools, and
//!   memory backends implement [`LlmClient`], [`Tool`], and
//!   [`MemoryBackend`]; the runtime only consumes the traits.
//! - **Bounded tool recursion**: the worker's LLM-tool loop runs at most
//!   [`MAX_TOOL_ROUNDS`] tool rounds per stage execution.
//!
//! ## Main modules
//!
//! - [`spec`]: [`AgentSpec`], [`Stage`], [`LlmConfig`], [`LlmParams`],
//!   validation, and the persisted JSON contract
//!   ([`serialize_spec`], [`deserialize_spec`]).
//! - [`dag`]: [`Dag`] — build, cycle validation, readiness queries.
//! - [`runtime`]: [`start`], [`execute`], [`AgentHandle`], the
//!   coordinator, stage workers, and the batch/result/progress managers.
//! - [`callback`]: [`AgentCallbacks`], [`StateManager`],
//!   outcome/directive types.
//! - [`memory`]: [`MemoryBackend`], [`MemoryManagerHandle`],
//!   [`InMemoryBackend`].
//! - [`llm`]: [`LlmClient`], [`LlmResponse`], [`MockLlm`].
//! - [`tool`]: [`Tool`], [`ToolSpec`], [`ToolContext`].
//! - [`registry`]: [`Registry`] of named implementations and secret
//!   providers.
//! - [`message`]: [`Message`] and tagged [`MessagePart`] variants.
//! - [`visualization`]: [`generate_dot`], [`generate_text`] for stage
//!   graphs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use stageflow::{
//!     execute, AgentSpec, LlmConfig, MockLlm, Registry, Stage, StartOptions,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Registry::new();
//! registry.register_llm_client("llm.Mock", std::sync::Arc::new(MockLlm::text("hello")));
//!
//! let spec = AgentSpec::new(
//!     "greeter",
//!     vec![Stage::new("greet").with_llm(LlmConfig::new("mock-1", "llm.Mock"))],
//! );
//!
//! let results = execute(
//!     spec,
//!     serde_json::json!("hi"),
//!     serde_json::json!({}),
//!     StartOptions::default(),
//!     Duration::from_secs(5),
//!     &registry,
//! )
//! .await
//! .unwrap();
//! println!("{:?}", results.get("greet"));
//! # }
//! ```

pub mod callback;
pub mod dag;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod registry;
pub mod runtime;
pub mod spec;
pub mod state;
pub mod tool;
pub mod visualization;

pub use callback::{
    AgentCallbacks, CallbackOutcome, ErrorDirective, NoopCallbacks, PlanOutcome, StateManager,
};
pub use dag::{Dag, DagError};
pub use error::{ErrorKind, ExecutionError, TerminationReason};
pub use llm::{LlmClient, LlmError, LlmResponse, MockLlm};
pub use memory::{
    InMemoryBackend, MemoryBackend, MemoryError, MemoryManagerHandle, MemoryOpts, SearchHit,
};
pub use message::{Message, MessagePart, Role};
pub use registry::{Registry, RegistryError, SecretProvider, IN_MEMORY_BACKEND};
pub use runtime::{
    execute, start, AgentHandle, BatchManager, BatchStats, BatchStatus, ExecuteError,
    ExecutionPhase, HandleError, NodeResultError, PhaseSnapshot, ProgressInfo, ProgressTracker,
    ResultManager, SendMessageError, StartError, StartOptions, MAX_TOOL_ROUNDS,
};
pub use spec::{
    deserialize_spec, serialize_spec, spec_from_json, spec_to_json, AgentConfig, AgentSpec,
    AgentStateMode, ApiKey, DeserializationError, LlmConfig, LlmParams, MemorySourceSpec,
    SpecError, Stage,
};
pub use runtime::ExecutionRecord;
pub use state::{AgentState, StageContext};
pub use tool::{Tool, ToolContext, ToolError, ToolSpec};
pub use visualization::{generate_dot, generate_text};

/// Loads `.env` and `~/.config/stageflow/config.toml` into the process
/// environment (existing env wins). Call once at process startup so
/// env-backed secret providers (see [`SecretProvider::env`]) resolve.
pub fn init_env() {
    if let Err(e) = env_config::load_and_apply("stageflow", None) {
        tracing::warn!(error = %e, "config load failed, continuing with process env");
    }
}
