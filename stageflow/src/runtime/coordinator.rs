//! Coordinator: the single-writer state machine orchestrating one agent.
//!
//! One tokio task per agent processes events one at a time:
//! `waiting_for_plan` computes the ready set and materializes a batch,
//! `execute_nodes` dispatches it to the stage workers, and
//! `awaiting_stage_results` collects completions in arrival order,
//! adopting each returned agent-state snapshot as the new truth. On full
//! completion a stateless agent terminates and a stateful one idles,
//! accepting inbound user messages that archive the previous run and
//! replan.
//!
//! Internal `Plan`/`Execute` events are self-posted on the same channel,
//! so a batch commit strictly precedes the next planning round.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::callback::StateManager;
use crate::dag::Dag;
use crate::error::{ExecutionError, TerminationReason};
use crate::memory::MemoryManagerHandle;
use crate::message::{Message, MessagePart};
use crate::spec::AgentSpec;
use crate::state::{AgentState, StageContext};
use uuid::Uuid;

use super::batch::{BatchManager, BatchStatus, PreparedNode};
use super::error_handler::{handle_execution_error, ErrorDisposition};
use super::progress::ProgressTracker;
use super::results::ResultManager;
use super::worker::{WorkerCommand, WorkerHandle};

/// Public phase of an agent, as reported by `get_results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// The coordinator is planning or about to dispatch.
    PlanningExecution,
    /// A batch is in flight.
    WaitingForStageResults,
    /// Stateful agent awaiting new messages; results are available.
    Idle,
    /// The run completed; results are available.
    Completed,
}

/// Reply to `get_results`: phase plus results when the phase carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSnapshot {
    pub phase: ExecutionPhase,
    pub results: Option<HashMap<String, Value>>,
}

/// Errors from `get_node_result`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeResultError {
    #[error("no result for that stage")]
    NotFound,
    #[error("still processing")]
    StillProcessing,
}

/// Errors from `send_message`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendMessageError {
    #[error("invalid message format")]
    InvalidMessageFormat,
    #[error("still processing last message")]
    StillProcessingLastMessage,
    #[error("agent is not stateful")]
    NotStateful,
}

/// Events processed by the coordinator task, one at a time.
pub enum CoordinatorEvent {
    /// Internal: compute the ready set and plan the next batch.
    Plan,
    /// Internal: dispatch the planned batch.
    Execute,
    /// A stage worker finished (or failed) its execution.
    StageResponse {
        stage: String,
        result: Result<Value, ExecutionError>,
        state: AgentState,
    },
    /// Public: report phase and (when available) results.
    GetResults {
        reply: oneshot::Sender<PhaseSnapshot>,
    },
    /// Public: one stage's result, valid once the run completed.
    GetNodeResult {
        stage: String,
        reply: oneshot::Sender<Result<Value, NodeResultError>>,
    },
    /// Public: archived result maps of prior runs (stateful agents).
    GetHistory {
        reply: oneshot::Sender<Vec<super::results::ExecutionRecord>>,
    },
    /// Public: inbound user message for a stateful agent.
    UserMessage {
        part: MessagePart,
        reply: oneshot::Sender<Result<(), SendMessageError>>,
    },
    /// Public: terminate the agent.
    Stop { ack: Option<oneshot::Sender<()>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitingForPlan,
    ExecuteNodes,
    AwaitingStageResults,
    Completed,
    Idle,
}

pub(crate) struct Coordinator {
    pub(crate) spec: Arc<AgentSpec>,
    pub(crate) session_id: Uuid,
    pub(crate) input: Value,
    pub(crate) initial_state: AgentState,
    pub(crate) current_state: AgentState,
    pub(crate) dag: Dag,
    pub(crate) results: ResultManager,
    pub(crate) batch: BatchManager,
    pub(crate) progress: ProgressTracker,
    pub(crate) workers: HashMap<String, WorkerHandle>,
    pub(crate) memory: MemoryManagerHandle,
    pub(crate) state_manager: StateManager,
    pub(crate) self_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    pub(crate) termination: Arc<Mutex<Option<TerminationReason>>>,
    phase: Phase,
    planned: Vec<PreparedNode>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        spec: Arc<AgentSpec>,
        input: Value,
        initial_state: AgentState,
        dag: Dag,
        workers: HashMap<String, WorkerHandle>,
        memory: MemoryManagerHandle,
        state_manager: StateManager,
        self_tx: mpsc::UnboundedSender<CoordinatorEvent>,
        termination: Arc<Mutex<Option<TerminationReason>>>,
    ) -> Self {
        let total = dag.len();
        Self {
            spec,
            session_id: Uuid::new_v4(),
            input,
            current_state: initial_state.clone(),
            initial_state,
            dag,
            results: ResultManager::new(),
            batch: BatchManager::new(),
            progress: ProgressTracker::new(total),
            workers,
            memory,
            state_manager,
            self_tx,
            termination,
            phase: Phase::WaitingForPlan,
            planned: Vec::new(),
        }
    }

    /// Runs the init callback, posts the first plan, and serves events
    /// until termination.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoordinatorEvent>) {
        info!(session = %self.session_id, agent = %self.spec.agent_config.name, "coordinator started");

        match self.state_manager.init(&self.dag, &self.current_state).await {
            Ok(state) => {
                self.current_state = state;
                let _ = self.self_tx.send(CoordinatorEvent::Plan);
            }
            Err(e) => {
                // Retry posts its own plan event; termination tears down below.
                if let Some(reason) = self.on_execution_error(e).await {
                    self.teardown(reason, None).await;
                    return;
                }
            }
        }

        let mut stop_ack = None;
        let reason = loop {
            let Some(event) = rx.recv().await else {
                break TerminationReason::Stopped;
            };
            match event {
                CoordinatorEvent::Plan => {
                    if let Err(e) = self.handle_plan().await {
                        if let Some(reason) = self.on_execution_error(e).await {
                            break reason;
                        }
                    }
                }
                CoordinatorEvent::Execute => {
                    if let Err(e) = self.handle_execute().await {
                        if let Some(reason) = self.on_execution_error(e).await {
                            break reason;
                        }
                    }
                }
                CoordinatorEvent::StageResponse {
                    stage,
                    result,
                    state,
                } => {
                    if let Err(e) = self.handle_stage_response(stage, result, state).await {
                        if let Some(reason) = self.on_execution_error(e).await {
                            break reason;
                        }
                    }
                }
                CoordinatorEvent::GetResults { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                CoordinatorEvent::GetNodeResult { stage, reply } => {
                    let _ = reply.send(self.node_result(&stage));
                }
                CoordinatorEvent::GetHistory { reply } => {
                    let _ = reply.send(self.results.history().to_vec());
                }
                CoordinatorEvent::UserMessage { part, reply } => {
                    let outcome = self.handle_user_message(part);
                    let routed_error = match &outcome {
                        Ok(Some(err)) => Some(err.clone()),
                        _ => None,
                    };
                    let _ = reply.send(outcome.map(|_| ()));
                    if let Some(err) = routed_error {
                        if let Some(reason) = self.on_execution_error(err).await {
                            break reason;
                        }
                    }
                }
                CoordinatorEvent::Stop { ack } => {
                    stop_ack = ack;
                    // Stopping a finished run records a completed termination.
                    break if self.phase == Phase::Completed {
                        TerminationReason::Completed
                    } else {
                        TerminationReason::Stopped
                    };
                }
            }
        };

        self.teardown(reason, stop_ack).await;
    }

    /// waiting_for_plan: compute the ready set, let the `plan` callback
    /// filter it, then either complete the run, stall, or materialize the
    /// next batch.
    async fn handle_plan(&mut self) -> Result<(), ExecutionError> {
        if self.results.completed_count() == self.dag.len() {
            let state = self
                .state_manager
                .complete(self.results.all(), &self.current_state)
                .await?;
            self.current_state = state;
            self.phase = if self.spec.is_stateful() {
                info!(session = %self.session_id, "run complete, idling for messages");
                Phase::Idle
            } else {
                info!(session = %self.session_id, "run complete");
                Phase::Completed
            };
            return Ok(());
        }

        let completed: HashSet<String> = self.results.all().keys().cloned().collect();
        let ready = self.dag.find_ready_nodes(&completed);
        let ready_names: Vec<String> = ready.iter().map(|s| s.name.clone()).collect();
        debug!(session = %self.session_id, ready = ?ready_names, "planning round");

        let (effective, state) = self
            .state_manager
            .plan(&ready_names, &self.current_state)
            .await?;
        self.current_state = state;

        if effective.is_empty() {
            return Err(ExecutionError::NoNodesReady {
                unfinished: self.dag.len() - self.results.completed_count(),
            });
        }

        let dependency_results = self.results.all().clone();
        self.planned = effective
            .iter()
            .filter_map(|name| self.dag.get(name))
            .map(|stage| PreparedNode {
                stage: stage.clone(),
                ctx: StageContext {
                    global_input: self.input.clone(),
                    initial_state: self.initial_state.clone(),
                    dependency_results: dependency_results.clone(),
                    agent_state: self.current_state.clone(),
                    spec: self.spec.clone(),
                    memory: self.memory.clone(),
                },
            })
            .collect();

        self.phase = Phase::ExecuteNodes;
        let _ = self.self_tx.send(CoordinatorEvent::Execute);
        Ok(())
    }

    /// execute_nodes: run `batch_start`, prepare and dispatch the batch.
    async fn handle_execute(&mut self) -> Result<(), ExecutionError> {
        let names: Vec<String> = self.planned.iter().map(|n| n.stage.name.clone()).collect();
        let state = self
            .state_manager
            .batch_start(&names, &self.current_state)
            .await?;
        self.current_state = state;

        let nodes = std::mem::take(&mut self.planned);
        self.batch.prepare(nodes, &self.current_state);
        let missing = self.batch.dispatch(&self.workers, self.self_tx.clone());
        self.phase = Phase::AwaitingStageResults;

        if let Some(name) = missing.into_iter().next() {
            return Err(ExecutionError::MissingWorker(name));
        }
        Ok(())
    }

    /// awaiting_stage_results: adopt the returned state, record the
    /// completion, fire per-completion callbacks, and commit the batch
    /// when the pending set drains.
    async fn handle_stage_response(
        &mut self,
        stage: String,
        result: Result<Value, ExecutionError>,
        state: AgentState,
    ) -> Result<(), ExecutionError> {
        if self.phase != Phase::AwaitingStageResults {
            warn!(stage = %stage, phase = ?self.phase, "stale stage response, ignoring");
            return Ok(());
        }

        self.current_state = state;

        let value = match result {
            Ok(value) => value,
            Err(reason) => {
                self.batch.reset();
                return Err(ExecutionError::Stage {
                    stage,
                    cause: reason.to_string(),
                    kind: reason.kind(),
                });
            }
        };

        let status = self.batch.on_completion(&stage, value.clone());

        if let Some(def) = self.dag.get(&stage).cloned() {
            let state = self
                .state_manager
                .stage_finish(&def, &value, &self.current_state)
                .await?;
            self.current_state = state;
        }

        self.progress
            .update(self.results.completed_count() + self.batch.completed_count());
        let info = self.progress.info();
        let state = self
            .state_manager
            .progress(&info, &self.current_state)
            .await?;
        self.current_state = state;

        if status == BatchStatus::Complete {
            let temp = self.batch.take_temp();
            self.batch.reset();
            self.results.commit_batch(temp.clone());

            let completed: HashSet<String> = self.results.all().keys().cloned().collect();
            let pending: Vec<String> = self
                .dag
                .stage_names()
                .iter()
                .filter(|n| !completed.contains(*n))
                .cloned()
                .collect();

            let state = self
                .state_manager
                .batch_complete(&temp, &pending, &self.current_state)
                .await?;
            self.current_state = state;

            self.phase = Phase::WaitingForPlan;
            let _ = self.self_tx.send(CoordinatorEvent::Plan);
        }
        Ok(())
    }

    /// idle: forward an inbound message to the entrypoint stage's worker,
    /// archive the previous run, and replan.
    ///
    /// Returns `Ok(Some(err))` when the message was accepted but a
    /// framework error must still be routed through the error path.
    fn handle_user_message(
        &mut self,
        part: MessagePart,
    ) -> Result<Option<ExecutionError>, SendMessageError> {
        if !self.spec.is_stateful() {
            return Err(SendMessageError::NotStateful);
        }
        match self.phase {
            Phase::Idle => {}
            Phase::AwaitingStageResults
            | Phase::WaitingForPlan
            | Phase::ExecuteNodes
            | Phase::Completed => {
                return Err(SendMessageError::StillProcessingLastMessage);
            }
        }
        if !matches!(part, MessagePart::Text { .. } | MessagePart::Data { .. }) {
            return Err(SendMessageError::InvalidMessageFormat);
        }

        let entry = self
            .spec
            .entrypoint_stage()
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let delivered = self
            .workers
            .get(&entry)
            .map(|worker| {
                worker.send(WorkerCommand::UpdateMessages {
                    message: Message::user_part(part),
                    reset_history: false,
                })
            })
            .unwrap_or(false);

        info!(session = %self.session_id, entrypoint = %entry, "user message accepted, replanning");
        self.results.archive_current();
        self.progress.reset();
        self.batch.reset();
        self.phase = Phase::WaitingForPlan;
        let _ = self.self_tx.send(CoordinatorEvent::Plan);

        if delivered {
            Ok(None)
        } else {
            Ok(Some(ExecutionError::MissingWorker(entry)))
        }
    }

    fn snapshot(&self) -> PhaseSnapshot {
        match self.phase {
            Phase::WaitingForPlan | Phase::ExecuteNodes => PhaseSnapshot {
                phase: ExecutionPhase::PlanningExecution,
                results: None,
            },
            Phase::AwaitingStageResults => PhaseSnapshot {
                phase: ExecutionPhase::WaitingForStageResults,
                results: None,
            },
            Phase::Idle => PhaseSnapshot {
                phase: ExecutionPhase::Idle,
                results: Some(self.results.all().clone()),
            },
            Phase::Completed => PhaseSnapshot {
                phase: ExecutionPhase::Completed,
                results: Some(self.results.all().clone()),
            },
        }
    }

    fn node_result(&self, stage: &str) -> Result<Value, NodeResultError> {
        match self.phase {
            Phase::Completed | Phase::Idle => self
                .results
                .get(stage)
                .cloned()
                .ok_or(NodeResultError::NotFound),
            _ => Err(NodeResultError::StillProcessing),
        }
    }

    /// Routes an execution error through the central policy. `None` means
    /// a retry was set up; `Some(reason)` terminates the coordinator.
    async fn on_execution_error(&mut self, error: ExecutionError) -> Option<TerminationReason> {
        match handle_execution_error(&self.state_manager, &error, &self.current_state).await {
            ErrorDisposition::Retry(state) => {
                self.current_state = state;
                self.planned.clear();
                self.batch.reset();
                self.phase = Phase::WaitingForPlan;
                let _ = self.self_tx.send(CoordinatorEvent::Plan);
                None
            }
            ErrorDisposition::Terminate(reason) => Some(reason),
        }
    }

    /// Terminates workers and memory backends, records the termination
    /// reason, and emits the final telemetry event.
    async fn teardown(self, reason: TerminationReason, stop_ack: Option<oneshot::Sender<()>>) {
        *self.termination.lock().unwrap() = Some(reason.clone());
        for worker in self.workers.values() {
            worker.send(WorkerCommand::Shutdown);
        }
        self.memory.terminate_all().await;
        info!(
            session = %self.session_id,
            agent = %self.spec.agent_config.name,
            reason = %reason,
            completed = self.results.completed_count(),
            "agent terminated"
        );
        if let Some(ack) = stop_ack {
            let _ = ack.send(());
        }
    }
}
