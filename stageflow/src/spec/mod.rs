//! Agent specification: the canonical declarative description of an agent.
//!
//! An [`AgentSpec`] is produced by an external declarative surface (or
//! deserialized from a persisted JSON document, see [`crate::spec::serial`])
//! and validated once before the coordinator consumes it. Specs are
//! immutable after creation.

mod llm_config;
pub mod serial;

pub use llm_config::{ApiKey, LlmConfig, LlmParams, ParamOutOfRange};
pub use serial::{deserialize_spec, serialize_spec, spec_from_json, spec_to_json, DeserializationError};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::dag::DagError;
use crate::message::Message;

/// Whether an agent keeps serving after its DAG completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStateMode {
    /// The coordinator idles after completion and accepts user messages.
    Stateful,
    /// The coordinator terminates after completion.
    Stateless,
}

/// Agent-level configuration carried by every spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_state: AgentStateMode,
    pub version: String,
    pub name: String,
}

/// One stage: a node in the execution DAG.
///
/// `depends_on` entries must name other stages in the same spec. In a
/// stateful agent, the stage flagged `entrypoint` receives inbound user
/// messages; with several flags set, the first by insertion order wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__struct__")]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub entrypoint: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
}

impl Stage {
    /// Creates a stage with no dependencies and no LLM.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            entrypoint: false,
            llm: None,
        }
    }

    /// Adds a dependency (builder).
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Flags this stage as the message entrypoint (builder).
    pub fn entrypoint(mut self) -> Self {
        self.entrypoint = true;
        self
    }

    /// Sets the LLM configuration (builder).
    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = Some(llm);
        self
    }

    /// The stage's prompt messages, empty when no LLM is configured.
    pub fn prompt_messages(&self) -> &[Message] {
        self.llm
            .as_ref()
            .map(|l| l.prompt_messages.as_slice())
            .unwrap_or(&[])
    }
}

/// A named memory source to register with the memory manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "MemorySource", tag = "__struct__")]
pub struct MemorySourceSpec {
    pub name: String,
    /// Registry name of the backend implementation.
    pub backend: String,
    #[serde(default)]
    pub opts: Value,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub description: String,
}

/// Spec validation failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpecError {
    #[error("agent spec has no stages")]
    EmptyStages,
    #[error("agent name must not be empty")]
    EmptyAgentName,
    #[error(transparent)]
    Dag(#[from] DagError),
    #[error("invalid llm params in stage '{stage}': {source}")]
    InvalidParams {
        stage: String,
        #[source]
        source: ParamOutOfRange,
    },
    #[error("duplicate memory source name: {0}")]
    DuplicateMemorySource(String),
}

/// The canonical agent spec. Immutable after validation.
///
/// **Interaction**: Validated by [`AgentSpec::validate`] at
/// [`start`](crate::runtime::start); the coordinator builds its DAG from
/// `stages`, registers `memory_sources`, and resolves `callback_module`
/// against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub memory_sources: Vec<MemorySourceSpec>,
    pub agent_config: AgentConfig,
    /// Registry name of the lifecycle-callback provider.
    pub callback_module: String,
}

impl AgentSpec {
    /// Creates a spec with the given stages and defaults elsewhere.
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            stages,
            memory_sources: Vec::new(),
            agent_config: AgentConfig {
                agent_state: AgentStateMode::Stateless,
                version: "1.0.0".to_string(),
                name: name.into(),
            },
            callback_module: String::new(),
        }
    }

    /// Switches the agent to stateful mode (builder).
    pub fn stateful(mut self) -> Self {
        self.agent_config.agent_state = AgentStateMode::Stateful;
        self
    }

    /// Sets the callback module registry name (builder).
    pub fn with_callbacks(mut self, module: impl Into<String>) -> Self {
        self.callback_module = module.into();
        self
    }

    /// Adds a memory source (builder).
    pub fn with_memory_source(mut self, source: MemorySourceSpec) -> Self {
        self.memory_sources.push(source);
        self
    }

    /// True when the agent idles after completion.
    pub fn is_stateful(&self) -> bool {
        self.agent_config.agent_state == AgentStateMode::Stateful
    }

    /// The stage receiving inbound user messages: the first flagged
    /// `entrypoint`, else the first stage by insertion order.
    pub fn entrypoint_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.entrypoint)
            .or_else(|| self.stages.first())
    }

    /// Validates the spec: non-empty stages, resolvable acyclic
    /// dependencies, in-range LLM params, and unique memory source names.
    ///
    /// Several `entrypoint` flags or several default memory sources are
    /// tolerated with a warning; the first by insertion order wins.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.stages.is_empty() {
            return Err(SpecError::EmptyStages);
        }
        if self.agent_config.name.is_empty() {
            return Err(SpecError::EmptyAgentName);
        }

        crate::dag::Dag::build(&self.stages)?;

        for stage in &self.stages {
            if let Some(llm) = &stage.llm {
                llm.params.validate().map_err(|source| SpecError::InvalidParams {
                    stage: stage.name.clone(),
                    source,
                })?;
            }
        }

        let mut seen = HashSet::new();
        for source in &self.memory_sources {
            if !seen.insert(source.name.as_str()) {
                return Err(SpecError::DuplicateMemorySource(source.name.clone()));
            }
        }

        let entrypoints: Vec<&str> = self
            .stages
            .iter()
            .filter(|s| s.entrypoint)
            .map(|s| s.name.as_str())
            .collect();
        if entrypoints.len() > 1 {
            warn!(
                agent = %self.agent_config.name,
                entrypoints = ?entrypoints,
                "multiple entrypoint stages; the first by insertion order receives messages"
            );
        }
        let defaults: Vec<&str> = self
            .memory_sources
            .iter()
            .filter(|s| s.default)
            .map(|s| s.name.as_str())
            .collect();
        if defaults.len() > 1 {
            warn!(
                agent = %self.agent_config.name,
                defaults = ?defaults,
                "multiple default memory sources; the last registered default wins"
            );
        }

        Ok(())
    }
}
