//! Integration test: a spec persisted to JSON is deserialized against the
//! registry and executed end to end.

mod common;
mod init_logging;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use stageflow::{
    deserialize_spec, execute, serialize_spec, spec_from_json, spec_to_json, AgentSpec,
    DeserializationError, LlmConfig, MemorySourceSpec, MockLlm, Registry, StartOptions,
    IN_MEMORY_BACKEND,
};

use common::text_stage;

fn persisted_registry() -> Registry {
    let registry = Registry::new();
    registry.register_llm_client("llm.a", Arc::new(MockLlm::text("x")));
    registry.register_llm_client("llm.b", Arc::new(MockLlm::text("y")));
    registry
}

fn persisted_spec() -> AgentSpec {
    AgentSpec::new(
        "persisted",
        vec![
            stageflow::Stage::new("a").with_llm(LlmConfig::new("mock-1", "llm.a")),
            stageflow::Stage::new("b")
                .depends_on("a")
                .with_llm(LlmConfig::new("mock-1", "llm.b")),
        ],
    )
    .with_memory_source(MemorySourceSpec {
        name: "main".into(),
        backend: IN_MEMORY_BACKEND.into(),
        opts: Value::Null,
        default: true,
        description: "scratch".into(),
    })
}

#[tokio::test]
async fn deserialized_spec_executes() {
    let registry = persisted_registry();
    let json = spec_to_json(&persisted_spec()).expect("serializes");
    let spec = spec_from_json(&json, &registry).expect("deserializes");

    let results = execute(
        spec,
        Value::Null,
        json!({}),
        StartOptions::default(),
        Duration::from_secs(5),
        &registry,
    )
    .await
    .expect("executes");

    assert_eq!(results.get("a"), Some(&json!("x")));
    assert_eq!(results.get("b"), Some(&json!("y")));
}

#[tokio::test]
async fn unknown_tool_reference_fails_precisely() {
    let registry = persisted_registry();
    let mut spec = persisted_spec();
    if let Some(llm) = &mut spec.stages[0].llm {
        llm.tools.push("Unknown.Tool".to_string());
    }
    let doc = serialize_spec(&spec).expect("serializes");

    let err = deserialize_spec(&doc, &registry).expect_err("unknown tool");
    assert_eq!(
        err,
        DeserializationError::ModuleNotLoaded {
            message: "Module not loaded".into(),
            module: "Unknown.Tool".into(),
        }
    );
}

#[tokio::test]
async fn registry_misses_fail_start_too() {
    // A spec that references an unregistered client passes validation but
    // cannot start.
    let registry = Registry::new();
    let spec = AgentSpec::new(
        "unresolvable",
        vec![stageflow::Stage::new("a").with_llm(LlmConfig::new("mock-1", "llm.ghost"))],
    );
    let err = stageflow::start(
        spec,
        Value::Null,
        json!({}),
        StartOptions::default(),
        &registry,
    )
    .await
    .expect_err("start fails");
    assert!(
        matches!(err, stageflow::StartError::Registry(_)),
        "got {:?}",
        err
    );
}

#[tokio::test]
async fn text_stage_helper_round_trips_through_document_form() {
    // Exercises the document layout keys: agent.stages, memory, agent_config.
    let registry = persisted_registry();
    let spec = AgentSpec::new("layout", vec![text_stage(&registry, "solo", "r")]);
    let doc = serialize_spec(&spec).expect("serializes");

    assert!(doc["agent"]["stages"].is_array());
    assert!(doc["memory"].is_array());
    assert!(doc["agent_config"].is_object());
    assert_eq!(doc["agent_config"]["agent_state"], json!("stateless"));

    let back = deserialize_spec(&doc, &registry).expect("deserializes");
    assert_eq!(back, spec);
}
