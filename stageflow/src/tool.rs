//! Tool capability: declaration plus execution.
//!
//! Stage specs reference tools by registry name; the worker resolves them
//! at spawn and exposes their [`ToolSpec`] declarations to the LLM. Tool
//! execution is fault-isolated in the worker: a failing tool becomes a
//! function-result error message fed back to the model, never a crash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{AgentState, StageContext};

/// Tool declaration sent to the LLM alongside the stage messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Tool name as referenced by function calls.
    pub name: String,
    /// Human-readable description for the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's arguments.
    pub parameters_schema: Value,
}

/// Errors from tool execution.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Arguments did not match the declared schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool ran and failed.
    #[error("tool execution failed: {0}")]
    Execution(String),
    /// The tool panicked; the cause is the panic payload.
    #[error("tool panicked: {0}")]
    Panic(String),
}

/// Per-call context handed to a tool by the stage worker.
///
/// Carries the executing stage's name, the current agent-state snapshot,
/// and the shared stage context (input, dependency results, memory
/// handle).
#[derive(Clone)]
pub struct ToolContext {
    /// Name of the stage executing this tool call.
    pub stage: String,
    /// Agent-state snapshot at call time; tools read, the coordinator writes.
    pub agent_state: AgentState,
    /// The dispatched stage context (memory handle, inputs, dependencies).
    pub stage_context: StageContext,
}

/// Tool capability: a declaration and an async run.
///
/// Implementations are registered by name in the
/// [`Registry`](crate::registry::Registry); stage specs list the names
/// they may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name; must match the name in [`Tool::spec`].
    fn name(&self) -> &str;

    /// Declaration shown to the LLM.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool with JSON arguments.
    async fn run(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of each ToolError variant names the failure class.
    #[test]
    fn tool_error_display_variants() {
        let s = ToolError::InvalidArguments("bad".into()).to_string();
        assert!(s.contains("invalid arguments"), "{}", s);
        let s = ToolError::Execution("io".into()).to_string();
        assert!(s.contains("execution failed"), "{}", s);
        let s = ToolError::Panic("oops".into()).to_string();
        assert!(s.contains("panicked"), "{}", s);
    }

    /// **Scenario**: ToolSpec round-trips through serde.
    #[test]
    fn tool_spec_roundtrip() {
        let spec = ToolSpec {
            name: "echo".into(),
            description: Some("Echo the input".into()),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {"s": {"type": "string"}}
            }),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: ToolSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, back);
    }
}
