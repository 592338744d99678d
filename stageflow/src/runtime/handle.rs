//! Public runtime API: start an agent, execute synchronously, and talk to
//! a running agent through its handle.
//!
//! [`start`] validates the spec, materializes the DAG, memory sources,
//! and workers, and spawns the coordinator task. [`execute`] is the
//! synchronous convenience: it polls the coordinator at a fixed interval
//! against a monotonic deadline and terminates the agent before
//! returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::callback::{AgentCallbacks, NoopCallbacks, StateManager};
use crate::dag::Dag;
use crate::error::TerminationReason;
use crate::memory::{MemoryError, MemoryManagerHandle};
use crate::message::MessagePart;
use crate::registry::{Registry, RegistryError};
use crate::spec::{AgentSpec, SpecError};
use crate::state::AgentState;

use super::coordinator::{
    Coordinator, CoordinatorEvent, ExecutionPhase, NodeResultError, PhaseSnapshot,
    SendMessageError,
};
use super::worker::spawn_worker;

/// Interval at which the synchronous API polls the coordinator.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options accepted by [`start`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Optional identifier for logs; defaults to the spec's agent name.
    pub name: Option<String>,
}

/// Failures while starting an agent.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("memory backend failed: {0}")]
    Memory(#[from] MemoryError),
}

/// Failures of the synchronous [`execute`] API.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Start(#[from] StartError),
    #[error("execution timed out")]
    Timeout,
    #[error("agent terminated: {0}")]
    Terminated(TerminationReason),
    #[error("agent unavailable")]
    Unavailable,
}

/// Failures of handle calls against a terminated agent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HandleError {
    #[error("agent terminated: {0}")]
    Terminated(TerminationReason),
    #[error("agent unavailable")]
    Unavailable,
}

/// Handle to a running agent.
///
/// Cheap to clone. All calls are messages to the coordinator task; once
/// the agent terminated, calls report the termination reason.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
    session_id: Uuid,
    name: String,
    termination: Arc<Mutex<Option<TerminationReason>>>,
}

impl AgentHandle {
    /// The coordinator session id.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The agent identifier used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The termination reason, once the agent terminated.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination.lock().unwrap().clone()
    }

    fn terminated_error(&self) -> HandleError {
        match self.termination_reason() {
            Some(reason) => HandleError::Terminated(reason),
            None => HandleError::Unavailable,
        }
    }

    /// Current phase plus results when the phase carries them.
    pub async fn get_results(&self) -> Result<PhaseSnapshot, HandleError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorEvent::GetResults { reply })
            .is_err()
        {
            return Err(self.terminated_error());
        }
        rx.await.map_err(|_| self.terminated_error())
    }

    /// One stage's result; valid once the run completed (or idles).
    pub async fn get_node_result(
        &self,
        stage: impl Into<String>,
    ) -> Result<Result<Value, NodeResultError>, HandleError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorEvent::GetNodeResult {
                stage: stage.into(),
                reply,
            })
            .is_err()
        {
            return Err(self.terminated_error());
        }
        rx.await.map_err(|_| self.terminated_error())
    }

    /// Archived result maps of prior runs, oldest first. A stateful
    /// agent archives the current map whenever it accepts an inbound
    /// message.
    pub async fn get_execution_history(
        &self,
    ) -> Result<Vec<super::results::ExecutionRecord>, HandleError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorEvent::GetHistory { reply })
            .is_err()
        {
            return Err(self.terminated_error());
        }
        rx.await.map_err(|_| self.terminated_error())
    }

    /// Sends a user message to a stateful agent's entrypoint stage.
    pub async fn send_message(
        &self,
        part: MessagePart,
    ) -> Result<Result<(), SendMessageError>, HandleError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorEvent::UserMessage { part, reply })
            .is_err()
        {
            return Err(self.terminated_error());
        }
        rx.await.map_err(|_| self.terminated_error())
    }

    /// Terminates the agent and waits for teardown.
    pub async fn stop(&self) {
        let (ack, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorEvent::Stop { ack: Some(ack) })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

/// Starts an agent asynchronously.
///
/// Validates the spec, builds and validates the DAG, initializes the
/// memory sources (failing fast on backend errors), resolves the LLM
/// clients, tools, and callback module against the registry, spawns one
/// worker per stage, and finally spawns the coordinator task.
pub async fn start(
    spec: AgentSpec,
    input: Value,
    initial_state: AgentState,
    opts: StartOptions,
    registry: &Registry,
) -> Result<AgentHandle, StartError> {
    spec.validate()?;
    let spec = Arc::new(spec);
    let dag = Dag::build(&spec.stages).map_err(SpecError::from)?;

    let memory = MemoryManagerHandle::new();
    for source in &spec.memory_sources {
        let backend = registry.create_backend(&source.backend, &source.opts)??;
        memory.add_source(source, backend).await;
    }
    memory.init_all().await?;

    let callbacks: Arc<dyn AgentCallbacks> = if spec.callback_module.is_empty() {
        Arc::new(NoopCallbacks)
    } else {
        registry.callbacks(&spec.callback_module)?
    };
    let state_manager = StateManager::new(callbacks);

    let mut workers = HashMap::new();
    for name in dag.stage_names() {
        let Some(stage) = dag.get(name) else { continue };
        let llm = match &stage.llm {
            Some(cfg) => Some(registry.llm_client(&cfg.client)?),
            None => None,
        };
        let mut tools = HashMap::new();
        if let Some(cfg) = &stage.llm {
            for tool_name in &cfg.tools {
                tools.insert(tool_name.clone(), registry.tool(tool_name)?);
            }
        }
        workers.insert(
            name.clone(),
            spawn_worker(stage.clone(), llm, tools, state_manager.clone()),
        );
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let termination = Arc::new(Mutex::new(None));
    let coordinator = Coordinator::new(
        spec.clone(),
        input,
        initial_state,
        dag,
        workers,
        memory,
        state_manager,
        tx.clone(),
        termination.clone(),
    );
    let session_id = coordinator.session_id;
    let name = opts
        .name
        .unwrap_or_else(|| spec.agent_config.name.clone());
    tokio::spawn(coordinator.run(rx));

    Ok(AgentHandle {
        tx,
        session_id,
        name,
        termination,
    })
}

/// Executes an agent synchronously.
///
/// Polls the coordinator every 100 ms until the run completes (stateless)
/// or idles (stateful), then terminates the agent and returns the result
/// map. Returns [`ExecuteError::Timeout`] once the monotonic deadline
/// passes; the coordinator is terminated either way.
pub async fn execute(
    spec: AgentSpec,
    input: Value,
    initial_state: AgentState,
    opts: StartOptions,
    timeout: Duration,
    registry: &Registry,
) -> Result<HashMap<String, Value>, ExecuteError> {
    let handle = start(spec, input, initial_state, opts, registry).await?;
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        match handle.get_results().await {
            Ok(PhaseSnapshot { phase, results }) => match phase {
                ExecutionPhase::Completed | ExecutionPhase::Idle => {
                    let results = results.unwrap_or_default();
                    handle.stop().await;
                    return Ok(results);
                }
                ExecutionPhase::PlanningExecution | ExecutionPhase::WaitingForStageResults => {}
            },
            Err(HandleError::Terminated(reason)) => {
                return Err(ExecuteError::Terminated(reason))
            }
            Err(HandleError::Unavailable) => return Err(ExecuteError::Unavailable),
        }
        if tokio::time::Instant::now() >= deadline {
            handle.stop().await;
            return Err(ExecuteError::Timeout);
        }
    }
}
