//! The execution runtime: coordinator, stage workers, and the managers
//! they orchestrate.
//!
//! # Main types
//!
//! - [`start`] / [`execute`] / [`AgentHandle`]: the public API.
//! - [`ResultManager`], [`BatchManager`], [`ProgressTracker`]: the
//!   coordinator's bookkeeping, exclusively coordinator-owned.
//! - [`spawn_worker`] / [`WorkerHandle`]: per-stage worker tasks running
//!   the LLM-tool interaction loop.
//! - [`handle_execution_error`]: the central retry/stop/restart policy.

mod batch;
mod coordinator;
mod error_handler;
mod handle;
mod progress;
mod results;
mod worker;

pub use batch::{BatchManager, BatchStats, BatchStatus, PreparedNode};
pub use coordinator::{
    CoordinatorEvent, ExecutionPhase, NodeResultError, PhaseSnapshot, SendMessageError,
};
pub use error_handler::{handle_execution_error, ErrorDisposition};
pub use handle::{
    execute, start, AgentHandle, ExecuteError, HandleError, StartError, StartOptions,
};
pub use progress::{ProgressInfo, ProgressTracker};
pub use results::{ExecutionRecord, ResultManager};
pub use worker::{spawn_worker, WorkerCommand, WorkerHandle, MAX_TOOL_ROUNDS};
