//! Persisted JSON form of an [`AgentSpec`] and its safe resolution.
//!
//! The document layout is `{agent: {stages, callback_module}, memory,
//! agent_config}`. Stages, memory sources, LLM configs, message parts,
//! and deferred API keys all carry a stable `__struct__` tag; binary file
//! parts are base64; implementations are stored as dotted names and
//! resolved against a [`Registry`] at deserialization, failing with a
//! precise error naming the missing module.

use serde_json::Value;
use thiserror::Error;

use crate::registry::Registry;

use super::{AgentConfig, AgentSpec, MemorySourceSpec, Stage};

/// Failures while reading a persisted spec document.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeserializationError {
    /// A referenced implementation is not present in the registry.
    #[error("{message}: {module}")]
    ModuleNotLoaded { message: String, module: String },
    /// The document shape does not match the contract.
    #[error("invalid spec document: {0}")]
    Invalid(String),
    /// The document parsed but the resulting spec is invalid.
    #[error("spec validation failed: {0}")]
    Validation(String),
}

impl DeserializationError {
    /// The canonical missing-implementation error.
    pub fn module_not_loaded(module: impl Into<String>) -> Self {
        Self::ModuleNotLoaded {
            message: "Module not loaded".to_string(),
            module: module.into(),
        }
    }
}

impl From<serde_json::Error> for DeserializationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Invalid(e.to_string())
    }
}

/// Serializes a spec into its persisted JSON document.
pub fn serialize_spec(spec: &AgentSpec) -> Result<Value, DeserializationError> {
    let stages = serde_json::to_value(&spec.stages)?;
    let memory = serde_json::to_value(&spec.memory_sources)?;
    let agent_config = serde_json::to_value(&spec.agent_config)?;
    Ok(serde_json::json!({
        "agent": {
            "stages": stages,
            "callback_module": spec.callback_module,
        },
        "memory": memory,
        "agent_config": agent_config,
    }))
}

/// Serializes a spec to a JSON string.
pub fn spec_to_json(spec: &AgentSpec) -> Result<String, DeserializationError> {
    let doc = serialize_spec(spec)?;
    serde_json::to_string(&doc).map_err(Into::into)
}

fn require<'a>(doc: &'a Value, key: &str) -> Result<&'a Value, DeserializationError> {
    doc.get(key)
        .ok_or_else(|| DeserializationError::Invalid(format!("missing key '{}'", key)))
}

/// Deserializes a persisted document, resolving every named
/// implementation against the registry.
///
/// Type validation (stages list, memory list, agent_config map) runs
/// first; then each referenced LLM client, tool, memory backend, and the
/// callback module must be present in the registry; finally the full spec
/// validation runs.
pub fn deserialize_spec(
    doc: &Value,
    registry: &Registry,
) -> Result<AgentSpec, DeserializationError> {
    let agent = require(doc, "agent")?;
    let stages_value = require(agent, "stages")?;
    if !stages_value.is_array() {
        return Err(DeserializationError::Invalid(
            "'agent.stages' must be a list".to_string(),
        ));
    }
    let stages: Vec<Stage> = serde_json::from_value(stages_value.clone())?;

    let callback_module = agent
        .get("callback_module")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let memory_value = doc.get("memory").cloned().unwrap_or(Value::Array(vec![]));
    if !memory_value.is_array() {
        return Err(DeserializationError::Invalid(
            "'memory' must be a list".to_string(),
        ));
    }
    let memory_sources: Vec<MemorySourceSpec> = serde_json::from_value(memory_value)?;

    let config_value = require(doc, "agent_config")?;
    if !config_value.is_object() {
        return Err(DeserializationError::Invalid(
            "'agent_config' must be a map".to_string(),
        ));
    }
    let agent_config: AgentConfig = serde_json::from_value(config_value.clone())?;

    let spec = AgentSpec {
        stages,
        memory_sources,
        agent_config,
        callback_module,
    };

    resolve_references(&spec, registry)?;

    spec.validate()
        .map_err(|e| DeserializationError::Validation(e.to_string()))?;
    Ok(spec)
}

/// Parses a JSON string and deserializes it.
pub fn spec_from_json(json: &str, registry: &Registry) -> Result<AgentSpec, DeserializationError> {
    let doc: Value = serde_json::from_str(json)?;
    deserialize_spec(&doc, registry)
}

fn resolve_references(spec: &AgentSpec, registry: &Registry) -> Result<(), DeserializationError> {
    if !spec.callback_module.is_empty() && !registry.has_callbacks(&spec.callback_module) {
        return Err(DeserializationError::module_not_loaded(&spec.callback_module));
    }
    for stage in &spec.stages {
        if let Some(llm) = &stage.llm {
            if !registry.has_llm_client(&llm.client) {
                return Err(DeserializationError::module_not_loaded(&llm.client));
            }
            for tool in &llm.tools {
                if !registry.has_tool(tool) {
                    return Err(DeserializationError::module_not_loaded(tool));
                }
            }
        }
    }
    for source in &spec.memory_sources {
        if !registry.has_memory_backend(&source.backend) {
            return Err(DeserializationError::module_not_loaded(&source.backend));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::message::{Message, MessagePart, Role};
    use crate::registry::IN_MEMORY_BACKEND;
    use crate::spec::{ApiKey, LlmConfig, LlmParams};
    use crate::tool::{Tool, ToolContext, ToolError, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "tools.Echo"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "tools.Echo".into(),
                description: None,
                parameters_schema: json!({}),
            }
        }
        async fn run(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            Ok(args)
        }
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        registry.register_llm_client("llm.Mock", Arc::new(MockLlm::text("hi")));
        registry.register_tool("tools.Echo", Arc::new(EchoTool));
        registry.register_callbacks("callbacks.Noop", Arc::new(crate::callback::NoopCallbacks));
        registry
    }

    fn full_spec() -> AgentSpec {
        let prompt = vec![
            Message::system("You are the fetch stage."),
            Message::new(
                Role::User,
                vec![MessagePart::File {
                    bytes: Some(vec![0xDE, 0xAD]),
                    uri: None,
                    mime: Some("application/octet-stream".into()),
                    name: Some("seed.bin".into()),
                }],
            ),
        ];
        let llm = LlmConfig::new("mock-1", "llm.Mock")
            .with_prompt(prompt)
            .with_tool("tools.Echo")
            .with_params(LlmParams {
                temperature: Some(0.7),
                max_tokens: Some(512),
                api_key: Some(ApiKey::provider("secrets", "openai", 0)),
                ..Default::default()
            });
        AgentSpec::new(
            "persisted-agent",
            vec![
                Stage::new("fetch").with_llm(llm),
                Stage::new("summarize").depends_on("fetch"),
            ],
        )
        .stateful()
        .with_callbacks("callbacks.Noop")
        .with_memory_source(MemorySourceSpec {
            name: "main".into(),
            backend: IN_MEMORY_BACKEND.into(),
            opts: json!({"capacity": 100}),
            default: true,
            description: "primary store".into(),
        })
    }

    /// **Scenario**: deserialize(serialize(s)) == s, including tagged
    /// stages, base64 file bytes, and the deferred api_key triple.
    #[test]
    fn roundtrip_equality() {
        let spec = full_spec();
        let doc = serialize_spec(&spec).unwrap();

        assert_eq!(doc["agent"]["stages"][0]["__struct__"], "Stage");
        assert_eq!(doc["agent"]["stages"][0]["llm"]["__struct__"], "LLMConfig");
        assert_eq!(doc["memory"][0]["__struct__"], "MemorySource");
        assert_eq!(
            doc["agent"]["stages"][0]["llm"]["prompt_messages"][1]["parts"][0]["bytes"],
            json!("3q0=")
        );

        let back = deserialize_spec(&doc, &registry()).unwrap();
        assert_eq!(spec, back);
    }

    /// **Scenario**: The string form round-trips too.
    #[test]
    fn json_string_roundtrip() {
        let spec = full_spec();
        let json = spec_to_json(&spec).unwrap();
        let back = spec_from_json(&json, &registry()).unwrap();
        assert_eq!(spec, back);
    }

    /// **Scenario**: A spec referencing an unknown tool deserializes to
    /// the precise "Module not loaded" error naming the module.
    #[test]
    fn unknown_tool_module_not_loaded() {
        let mut spec = full_spec();
        if let Some(llm) = &mut spec.stages[0].llm {
            llm.tools = vec!["Unknown.Tool".to_string()];
        }
        let doc = serialize_spec(&spec).unwrap();
        let err = deserialize_spec(&doc, &registry()).unwrap_err();
        assert_eq!(
            err,
            DeserializationError::ModuleNotLoaded {
                message: "Module not loaded".into(),
                module: "Unknown.Tool".into(),
            }
        );
    }

    /// **Scenario**: Unknown LLM client, backend, and callback module are
    /// each reported with their dotted name.
    #[test]
    fn each_reference_kind_is_checked() {
        let registry = registry();

        let mut spec = full_spec();
        if let Some(llm) = &mut spec.stages[0].llm {
            llm.client = "Unknown.Client".into();
        }
        let err = deserialize_spec(&serialize_spec(&spec).unwrap(), &registry).unwrap_err();
        assert!(matches!(err, DeserializationError::ModuleNotLoaded { module, .. } if module == "Unknown.Client"));

        let mut spec = full_spec();
        spec.memory_sources[0].backend = "Unknown.Backend".into();
        let err = deserialize_spec(&serialize_spec(&spec).unwrap(), &registry).unwrap_err();
        assert!(matches!(err, DeserializationError::ModuleNotLoaded { module, .. } if module == "Unknown.Backend"));

        let mut spec = full_spec();
        spec.callback_module = "Unknown.Callbacks".into();
        let err = deserialize_spec(&serialize_spec(&spec).unwrap(), &registry).unwrap_err();
        assert!(matches!(err, DeserializationError::ModuleNotLoaded { module, .. } if module == "Unknown.Callbacks"));
    }

    /// **Scenario**: Shape violations are rejected with Invalid.
    #[test]
    fn shape_validation() {
        let registry = registry();

        let err = deserialize_spec(&json!({}), &registry).unwrap_err();
        assert!(matches!(err, DeserializationError::Invalid(m) if m.contains("agent")));

        let err = deserialize_spec(
            &json!({"agent": {"stages": "not-a-list"}, "agent_config": {}}),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, DeserializationError::Invalid(m) if m.contains("stages")));

        let err = deserialize_spec(
            &json!({"agent": {"stages": []}, "memory": {}, "agent_config": {}}),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, DeserializationError::Invalid(m) if m.contains("memory")));

        let err = deserialize_spec(
            &json!({"agent": {"stages": []}, "agent_config": "nope"}),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, DeserializationError::Invalid(m) if m.contains("agent_config")));
    }

    /// **Scenario**: A document that parses but violates spec invariants
    /// (empty stages) fails post-deserialization validation.
    #[test]
    fn post_deserialization_validation() {
        let registry = registry();
        let doc = json!({
            "agent": {"stages": [], "callback_module": ""},
            "memory": [],
            "agent_config": {"agent_state": "stateless", "version": "1.0.0", "name": "x"},
        });
        let err = deserialize_spec(&doc, &registry).unwrap_err();
        assert!(matches!(err, DeserializationError::Validation(m) if m.contains("no stages")));
    }
}
