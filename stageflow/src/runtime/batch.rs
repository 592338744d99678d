//! Batch manager: the set of stages dispatched in one planning round.
//!
//! Prepared nodes carry their dispatch context (with the coordinator's
//! current agent state overlaid); completions drain the pending set into
//! temp results until the batch is complete and the coordinator commits.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::spec::Stage;
use crate::state::{AgentState, StageContext};

use super::coordinator::CoordinatorEvent;
use super::worker::{WorkerCommand, WorkerHandle};

/// A stage ready for dispatch, with its materialized context.
#[derive(Clone)]
pub struct PreparedNode {
    pub stage: Arc<Stage>,
    pub ctx: StageContext,
}

/// Outcome of recording one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// The pending set drained; the batch is ready to commit.
    Complete,
    /// Completions are still outstanding.
    Pending,
}

/// Batch statistics for observability and the progress callback.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub completion_percentage: f64,
}

/// The current dispatch batch.
///
/// **Interaction**: Coordinator-owned. `prepare` then `dispatch` per
/// planning round; `on_completion` per stage response; `take_temp` +
/// `reset` when the batch completes or the error path clears it.
#[derive(Default)]
pub struct BatchManager {
    nodes: HashMap<String, PreparedNode>,
    pending: HashSet<String>,
    temp_results: HashMap<String, Value>,
    total: usize,
}

impl BatchManager {
    /// Creates an empty batch manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Materializes the batch. Each node's context receives the
    /// coordinator's current agent state, overlaid at dispatch time.
    pub fn prepare(&mut self, nodes: Vec<PreparedNode>, agent_state: &AgentState) {
        self.nodes.clear();
        self.pending.clear();
        self.temp_results.clear();
        self.total = nodes.len();
        for mut node in nodes {
            node.ctx.agent_state = agent_state.clone();
            self.pending.insert(node.stage.name.clone());
            self.nodes.insert(node.stage.name.clone(), node);
        }
    }

    /// Sends an execute command to each node's worker.
    ///
    /// A missing worker is logged and its node skipped; the returned list
    /// names the skipped nodes so the coordinator can route the failure
    /// through its error path.
    pub fn dispatch(
        &self,
        workers: &HashMap<String, WorkerHandle>,
        reply: tokio::sync::mpsc::UnboundedSender<CoordinatorEvent>,
    ) -> Vec<String> {
        let mut missing = Vec::new();
        for (name, node) in &self.nodes {
            match workers.get(name) {
                Some(worker) => {
                    debug!(stage = %name, "dispatching stage");
                    let delivered = worker.send(WorkerCommand::Execute {
                        ctx: node.ctx.clone(),
                        reply: reply.clone(),
                    });
                    if !delivered {
                        warn!(stage = %name, "worker channel closed, skipping dispatch");
                        missing.push(name.clone());
                    }
                }
                None => {
                    warn!(stage = %name, "no worker for stage, skipping dispatch");
                    missing.push(name.clone());
                }
            }
        }
        missing
    }

    /// Records a completion: appends to temp results and removes the node
    /// from pending. Responses for nodes outside the batch (e.g. a batch
    /// cleared by the error path) are ignored with a warning.
    pub fn on_completion(&mut self, name: &str, result: Value) -> BatchStatus {
        if !self.pending.remove(name) && !self.nodes.contains_key(name) {
            warn!(stage = %name, "completion for a node outside the current batch, ignoring");
            return if self.pending.is_empty() && !self.nodes.is_empty() {
                BatchStatus::Complete
            } else {
                BatchStatus::Pending
            };
        }
        self.temp_results.insert(name.to_string(), result);
        if self.pending.is_empty() {
            BatchStatus::Complete
        } else {
            BatchStatus::Pending
        }
    }

    /// The prepared node for a stage, if in the current batch.
    pub fn node(&self, name: &str) -> Option<&PreparedNode> {
        self.nodes.get(name)
    }

    /// Results collected so far in this batch.
    pub fn temp_results(&self) -> &HashMap<String, Value> {
        &self.temp_results
    }

    /// Number of completions collected so far.
    pub fn completed_count(&self) -> usize {
        self.temp_results.len()
    }

    /// Takes the collected results, leaving the batch empty.
    pub fn take_temp(&mut self) -> HashMap<String, Value> {
        std::mem::take(&mut self.temp_results)
    }

    /// True when nothing is dispatched or pending.
    pub fn is_idle(&self) -> bool {
        self.nodes.is_empty() && self.pending.is_empty()
    }

    /// Batch statistics.
    pub fn stats(&self) -> BatchStats {
        let completed = self.temp_results.len();
        let completion_percentage = if self.total == 0 {
            0.0
        } else {
            (completed as f64 / self.total as f64) * 100.0
        };
        BatchStats {
            total: self.total,
            completed,
            pending: self.pending.len(),
            completion_percentage,
        }
    }

    /// Clears everything: nodes, pending, temp results.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.pending.clear();
        self.temp_results.clear();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryManagerHandle;
    use crate::spec::AgentSpec;
    use serde_json::json;

    fn prepared(name: &str) -> PreparedNode {
        let spec = Arc::new(AgentSpec::new("t", vec![Stage::new(name)]));
        PreparedNode {
            stage: Arc::new(Stage::new(name)),
            ctx: StageContext {
                global_input: Value::Null,
                initial_state: Value::Null,
                dependency_results: HashMap::new(),
                agent_state: Value::Null,
                spec,
                memory: MemoryManagerHandle::new(),
            },
        }
    }

    /// **Scenario**: prepare overlays the current agent state into every
    /// node context.
    #[test]
    fn prepare_overlays_agent_state() {
        let mut bm = BatchManager::new();
        bm.prepare(vec![prepared("a"), prepared("b")], &json!({"step": 3}));
        assert_eq!(bm.node("a").unwrap().ctx.agent_state, json!({"step": 3}));
        assert_eq!(bm.node("b").unwrap().ctx.agent_state, json!({"step": 3}));
        assert_eq!(bm.stats().total, 2);
        assert_eq!(bm.stats().pending, 2);
    }

    /// **Scenario**: The batch completes exactly when the pending set
    /// drains; stats track the percentage.
    #[test]
    fn completion_drains_pending() {
        let mut bm = BatchManager::new();
        bm.prepare(vec![prepared("a"), prepared("b")], &Value::Null);

        assert_eq!(bm.on_completion("a", json!("ra")), BatchStatus::Pending);
        assert_eq!(bm.stats().completion_percentage, 50.0);
        assert_eq!(bm.on_completion("b", json!("rb")), BatchStatus::Complete);
        assert_eq!(bm.completed_count(), 2);

        let temp = bm.take_temp();
        assert_eq!(temp.get("a"), Some(&json!("ra")));
        assert_eq!(temp.get("b"), Some(&json!("rb")));
        assert!(bm.temp_results().is_empty());
    }

    /// **Scenario**: A completion for an unknown node is ignored and does
    /// not poison the batch.
    #[test]
    fn unknown_completion_ignored() {
        let mut bm = BatchManager::new();
        bm.prepare(vec![prepared("a")], &Value::Null);
        assert_eq!(bm.on_completion("ghost", json!(1)), BatchStatus::Pending);
        assert!(bm.temp_results().is_empty());
        assert_eq!(bm.on_completion("a", json!(2)), BatchStatus::Complete);
    }

    /// **Scenario**: reset clears the whole batch.
    #[test]
    fn reset_clears_batch() {
        let mut bm = BatchManager::new();
        bm.prepare(vec![prepared("a")], &Value::Null);
        bm.on_completion("a", json!(1));
        bm.reset();
        assert!(bm.is_idle());
        assert_eq!(bm.stats().total, 0);
        assert_eq!(bm.stats().completion_percentage, 0.0);
    }

    /// **Scenario**: dispatch with no workers reports every node missing.
    #[tokio::test]
    async fn dispatch_reports_missing_workers() {
        let mut bm = BatchManager::new();
        bm.prepare(vec![prepared("a"), prepared("b")], &Value::Null);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut missing = bm.dispatch(&HashMap::new(), tx);
        missing.sort();
        assert_eq!(missing, ["a", "b"]);
    }
}
