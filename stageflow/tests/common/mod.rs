//! Shared helpers for runtime integration tests: a recording callback
//! module and spec builders over scripted mock LLMs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use stageflow::{
    AgentCallbacks, AgentState, CallbackOutcome, Dag, ErrorDirective, ExecutionError, LlmConfig,
    MockLlm, PlanOutcome, ProgressInfo, Registry, Stage, ToolError,
};

/// Everything the recording callbacks observed, for assertions.
#[derive(Default)]
pub struct Recording {
    pub init_calls: usize,
    pub plan_calls: usize,
    pub batch_start_batches: Vec<Vec<String>>,
    pub stage_finishes: Vec<String>,
    pub progress_infos: Vec<ProgressInfo>,
    pub batch_complete_calls: usize,
    pub complete_calls: usize,
    pub complete_results: Option<HashMap<String, Value>>,
    pub tool_calls: Vec<String>,
    pub tool_results: Vec<String>,
    pub errors: Vec<String>,
}

/// Pass-through callbacks that record every invocation.
///
/// The `error` hook retries up to `retries_allowed` times, then stops.
pub struct RecordingCallbacks {
    pub recording: Arc<Mutex<Recording>>,
    pub retries_allowed: usize,
}

impl RecordingCallbacks {
    pub fn new() -> (Arc<Self>, Arc<Mutex<Recording>>) {
        Self::with_retries(0)
    }

    pub fn with_retries(retries_allowed: usize) -> (Arc<Self>, Arc<Mutex<Recording>>) {
        let recording = Arc::new(Mutex::new(Recording::default()));
        (
            Arc::new(Self {
                recording: recording.clone(),
                retries_allowed,
            }),
            recording,
        )
    }
}

#[async_trait]
impl AgentCallbacks for RecordingCallbacks {
    async fn init(&self, _dag: &Dag, state: AgentState) -> CallbackOutcome {
        self.recording.lock().unwrap().init_calls += 1;
        CallbackOutcome::Continue(state)
    }

    async fn plan(&self, ready: &[String], state: AgentState) -> PlanOutcome {
        self.recording.lock().unwrap().plan_calls += 1;
        PlanOutcome::Planned {
            nodes: ready.to_vec(),
            state,
        }
    }

    async fn batch_start(&self, nodes: &[String], state: AgentState) -> CallbackOutcome {
        let mut batch = nodes.to_vec();
        batch.sort();
        self.recording.lock().unwrap().batch_start_batches.push(batch);
        CallbackOutcome::Continue(state)
    }

    async fn stage_finish(
        &self,
        stage: &Stage,
        _result: &Value,
        state: AgentState,
    ) -> CallbackOutcome {
        self.recording
            .lock()
            .unwrap()
            .stage_finishes
            .push(stage.name.clone());
        CallbackOutcome::Continue(state)
    }

    async fn progress(&self, info: &ProgressInfo, state: AgentState) -> CallbackOutcome {
        self.recording.lock().unwrap().progress_infos.push(info.clone());
        CallbackOutcome::Continue(state)
    }

    async fn batch_complete(
        &self,
        _batch_results: &HashMap<String, Value>,
        _pending: &[String],
        state: AgentState,
    ) -> CallbackOutcome {
        self.recording.lock().unwrap().batch_complete_calls += 1;
        CallbackOutcome::Continue(state)
    }

    async fn complete(
        &self,
        final_results: &HashMap<String, Value>,
        state: AgentState,
    ) -> CallbackOutcome {
        let mut rec = self.recording.lock().unwrap();
        rec.complete_calls += 1;
        rec.complete_results = Some(final_results.clone());
        CallbackOutcome::Continue(state)
    }

    async fn tool_call(&self, name: &str, _args: &Value, state: AgentState) -> CallbackOutcome {
        self.recording.lock().unwrap().tool_calls.push(name.to_string());
        CallbackOutcome::Continue(state)
    }

    async fn tool_result(
        &self,
        name: &str,
        _outcome: &Result<Value, ToolError>,
        state: AgentState,
    ) -> CallbackOutcome {
        self.recording
            .lock()
            .unwrap()
            .tool_results
            .push(name.to_string());
        CallbackOutcome::Continue(state)
    }

    async fn error(&self, error: &ExecutionError, state: AgentState) -> ErrorDirective {
        let mut rec = self.recording.lock().unwrap();
        rec.errors.push(error.to_string());
        if rec.errors.len() <= self.retries_allowed {
            ErrorDirective::Retry(state)
        } else {
            ErrorDirective::Stop(error.to_string())
        }
    }
}

/// Registers a text-scripted mock LLM client named `llm.<stage>` and
/// returns a stage using it.
pub fn text_stage(registry: &Registry, name: &str, reply: &str) -> Stage {
    let client = format!("llm.{}", name);
    registry.register_llm_client(client.as_str(), Arc::new(MockLlm::text(reply)));
    Stage::new(name).with_llm(LlmConfig::new("mock-1", client))
}

/// Registers the recording callbacks under `callbacks.Recording`.
pub fn register_recording(
    registry: &Registry,
    callbacks: Arc<RecordingCallbacks>,
) -> &'static str {
    registry.register_callbacks("callbacks.Recording", callbacks);
    "callbacks.Recording"
}
