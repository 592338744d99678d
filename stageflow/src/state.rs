//! Agent state and the per-dispatch stage context.
//!
//! Agent state is a user-defined JSON value: the coordinator is its
//! single writer, workers receive snapshots in their dispatch context and
//! return possibly-updated snapshots, which the coordinator adopts in
//! arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::memory::MemoryManagerHandle;
use crate::spec::AgentSpec;

/// User-defined agent state. Shaped entirely by the callback module.
pub type AgentState = Value;

/// Context materialized for one stage dispatch.
///
/// Snapshot semantics: `dependency_results` and `agent_state` are copies
/// taken at dispatch time; workers never read other workers' results.
/// The memory handle is shared (cheap clone of the manager).
#[derive(Clone)]
pub struct StageContext {
    /// The input the whole run was started with.
    pub global_input: Value,
    /// The initial state the run was started with.
    pub initial_state: AgentState,
    /// Results of every completed stage at planning time.
    pub dependency_results: HashMap<String, Value>,
    /// The coordinator's current agent state, overlaid at dispatch.
    pub agent_state: AgentState,
    /// The spec this run executes.
    pub spec: Arc<AgentSpec>,
    /// Shared memory manager handle.
    pub memory: MemoryManagerHandle,
}

impl StageContext {
    /// Returns the result of a completed dependency stage.
    pub fn dependency(&self, name: &str) -> Option<&Value> {
        self.dependency_results.get(name)
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("global_input", &self.global_input)
            .field("dependency_results", &self.dependency_results.keys())
            .field("agent_state", &self.agent_state)
            .field("agent", &self.spec.agent_config.name)
            .finish()
    }
}
