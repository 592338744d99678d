//! Stage worker: a per-node task running the LLM-tool interaction loop.
//!
//! One worker per DAG node, spawned at coordinator init. A worker is idle
//! until it receives an execute command, runs its stage, reports a
//! `stage_response` back to the coordinator, and returns to idle. Workers
//! own only their private conversation history and the agent-state
//! snapshot they were dispatched with.
//!
//! # Interaction loop
//!
//! 1. Build the outbound messages: prior history, or (on first run) the
//!    stage prompt plus the run input.
//! 2. Invoke the configured LLM client.
//! 3. Function calls against declared tools run through the `tool_call`
//!    / `tool_result` callbacks with fault isolation, and both the
//!    assistant turn and a user-role function-result turn are appended.
//!    Undeclared tools produce one synthetic user-role error message per
//!    round. Either way the loop continues.
//! 4. Tool rounds are bounded by [`MAX_TOOL_ROUNDS`]; exhaustion returns
//!    `max_tool_iterations_reached` with the accumulated history kept.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::callback::{panic_message, StateManager};
use crate::error::{ErrorKind, ExecutionError};
use crate::llm::LlmClient;
use crate::message::{Message, MessagePart, Role};
use crate::spec::Stage;
use crate::state::{AgentState, StageContext};
use crate::tool::{Tool, ToolContext, ToolError, ToolSpec};

use super::coordinator::CoordinatorEvent;

/// Upper bound on tool rounds within one stage execution.
pub const MAX_TOOL_ROUNDS: u32 = 5;

/// Commands accepted by a stage worker while idle.
pub enum WorkerCommand {
    /// Execute the stage with the given context; the response is sent to
    /// `reply` as a [`CoordinatorEvent::StageResponse`].
    Execute {
        ctx: StageContext,
        reply: mpsc::UnboundedSender<CoordinatorEvent>,
    },
    /// Append (or replace) the worker's private conversation history.
    /// Used for stateful agents receiving ad-hoc user messages.
    UpdateMessages {
        message: Message,
        reset_history: bool,
    },
    /// Terminate the worker task.
    Shutdown,
}

/// Handle to a spawned worker, held by the coordinator keyed by stage name.
#[derive(Clone)]
pub struct WorkerHandle {
    name: String,
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerHandle {
    /// The stage this worker executes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a command; returns false when the worker task is gone.
    pub fn send(&self, cmd: WorkerCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }
}

/// Spawns the worker task for one stage.
///
/// The LLM client and tools were resolved from the registry at
/// coordinator init; a stage without an LLM config gets `None` and
/// resolves to a null result (a pure join point in the DAG).
pub fn spawn_worker(
    stage: Arc<Stage>,
    llm: Option<Arc<dyn LlmClient>>,
    tools: HashMap<String, Arc<dyn Tool>>,
    state_manager: StateManager,
) -> WorkerHandle {
    let name = stage.name.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut worker = StageWorker {
            stage,
            llm,
            tools,
            state_manager,
            history: Vec::new(),
        };
        while let Some(cmd) = rx.recv().await {
            match cmd {
                WorkerCommand::Execute { ctx, reply } => {
                    let (result, state) = worker.execute(&ctx).await;
                    let event = CoordinatorEvent::StageResponse {
                        stage: worker.stage.name.clone(),
                        result,
                        state,
                    };
                    if reply.send(event).is_err() {
                        warn!(stage = %worker.stage.name, "coordinator gone, dropping stage response");
                    }
                }
                WorkerCommand::UpdateMessages {
                    message,
                    reset_history,
                } => {
                    if reset_history {
                        worker.history = vec![message];
                    } else {
                        worker.history.push(message);
                    }
                }
                WorkerCommand::Shutdown => break,
            }
        }
        trace!(stage = %worker.stage.name, "worker terminated");
    });
    WorkerHandle { name, tx }
}

struct StageWorker {
    stage: Arc<Stage>,
    llm: Option<Arc<dyn LlmClient>>,
    tools: HashMap<String, Arc<dyn Tool>>,
    state_manager: StateManager,
    /// Private conversation history, kept across executions for stateful
    /// re-entry.
    history: Vec<Message>,
}

impl StageWorker {
    async fn execute(&mut self, ctx: &StageContext) -> (Result<Value, ExecutionError>, AgentState) {
        let mut state = ctx.agent_state.clone();

        match self.state_manager.stage_start(&self.stage, &state).await {
            Ok(next) => state = next,
            Err(e) => return (Err(e), state),
        }

        let Some(llm_config) = self.stage.llm.clone() else {
            // No LLM: the stage is a pure join point; its result is null.
            debug!(stage = %self.stage.name, "stage has no llm config, resolving to null");
            return (Ok(Value::Null), state);
        };
        let Some(llm) = self.llm.clone() else {
            let err = ExecutionError::stage(
                &self.stage.name,
                format!("llm client '{}' was not resolved", llm_config.client),
                ErrorKind::Framework,
            );
            return (Err(err), state);
        };

        let tool_specs: Vec<ToolSpec> = llm_config
            .tools
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
            .collect();

        // First run seeds prompt + input; re-entry continues the history.
        let mut messages = if self.history.is_empty() {
            let mut seeded = llm_config.prompt_messages.clone();
            match &ctx.global_input {
                Value::Null => {}
                Value::String(s) => seeded.push(Message::user(s.clone())),
                other => seeded.push(Message::user_part(MessagePart::data(other.clone()))),
            }
            seeded
        } else {
            self.history.clone()
        };

        let mut rounds = 0u32;
        loop {
            let response = match llm
                .completion(&llm_config.model, &messages, &tool_specs, &llm_config.params)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    // Pre-call history preserved for a later retry.
                    self.history = messages;
                    warn!(stage = %self.stage.name, error = %e, "llm call failed");
                    return (Err(ExecutionError::Llm(e.to_string())), state);
                }
            };

            let calls = response.function_calls();
            if calls.is_empty() {
                messages.push(Message::new(Role::Assistant, response.to_parts()));
                self.history = messages;
                return (Ok(response.into_result_value()), state);
            }

            if rounds >= MAX_TOOL_ROUNDS {
                self.history = messages;
                return (Err(ExecutionError::MaxToolIterations(MAX_TOOL_ROUNDS)), state);
            }
            rounds += 1;

            messages.push(Message::new(Role::Assistant, response.to_parts()));

            let mut undeclared: Option<String> = None;
            for call in calls {
                let MessagePart::FunctionCall { id, name, args } = call else {
                    continue;
                };
                let declared = llm_config.tools.iter().any(|t| t == &name);
                let tool = if declared { self.tools.get(&name).cloned() } else { None };
                let Some(tool) = tool else {
                    if undeclared.is_none() {
                        undeclared = Some(name.clone());
                    }
                    continue;
                };

                match self.state_manager.tool_call(&name, &args, &state).await {
                    Ok(next) => state = next,
                    Err(e) => return (Err(e), state),
                }

                let outcome = self
                    .run_tool_isolated(&tool, args.clone(), ctx, &state)
                    .await;
                trace!(
                    stage = %self.stage.name,
                    tool = %name,
                    ok = outcome.is_ok(),
                    "tool executed"
                );

                match self.state_manager.tool_result(&name, &outcome, &state).await {
                    Ok(next) => state = next,
                    Err(e) => return (Err(e), state),
                }

                let result_value = match &outcome {
                    Ok(value) => value.clone(),
                    Err(e) => serde_json::json!({ "error": e.to_string() }),
                };
                messages.push(Message::user_part(MessagePart::function_result(
                    id.clone(),
                    name.clone(),
                    result_value,
                )));
            }

            if let Some(name) = undeclared {
                messages.push(Message::user(format!(
                    "Error: tool '{}' is not declared for this stage.",
                    name
                )));
            }
        }
    }

    /// Runs a tool with panic isolation; a panic becomes `ToolError::Panic`.
    async fn run_tool_isolated(
        &self,
        tool: &Arc<dyn Tool>,
        args: Value,
        ctx: &StageContext,
        state: &AgentState,
    ) -> Result<Value, ToolError> {
        let tool_ctx = ToolContext {
            stage: self.stage.name.clone(),
            agent_state: state.clone(),
            stage_context: ctx.clone(),
        };
        match AssertUnwindSafe(tool.run(args, &tool_ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ToolError::Panic(panic_message(payload))),
        }
    }
}
