//! Per-stage LLM configuration: model, client reference, params, prompts.
//!
//! Params carry the provider-portable sampling knobs with range
//! validation, plus `other_params` for provider-specific extras. API keys
//! are either literals or deferred references to a registered secret
//! provider; deferred keys survive serialization as a
//! module-function-arity triple.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::Message;

/// An API key: literal, deferred to a named provider, or unserializable.
///
/// `Provider` is the persistable form of a deferred secret: the runtime
/// reconstructs the callable from the registry's secret providers.
/// `NonSerializable` marks a key that was configured in process and
/// cannot be persisted; resolving it fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__struct__")]
pub enum ApiKey {
    /// The key itself, stored verbatim.
    Literal { value: String },
    /// Deferred reference: `module.function` with arity 0 or 1.
    /// Arity-1 providers receive the model name.
    Provider {
        module: String,
        function: String,
        arity: u8,
    },
    /// Sentinel for keys that cannot be represented in a persisted spec.
    NonSerializable,
}

impl ApiKey {
    /// Creates a literal key.
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    /// Creates a deferred provider reference.
    pub fn provider(module: impl Into<String>, function: impl Into<String>, arity: u8) -> Self {
        Self::Provider {
            module: module.into(),
            function: function.into(),
            arity,
        }
    }
}

/// A sampling parameter outside its allowed range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{param} out of range: {value} not in [{min}, {max}]")]
pub struct ParamOutOfRange {
    pub param: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Provider-portable LLM sampling parameters.
///
/// All fields are optional; providers apply their own defaults for absent
/// values. [`LlmParams::validate`] enforces the portable ranges
/// (temperature in [0, 2], top_p in [0, 1], penalties in [-2, 2]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    /// JSON Schema the provider should shape its response to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
    /// Provider-specific extras, passed through opaquely.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub other_params: Map<String, Value>,
}

impl LlmParams {
    /// Checks the portable ranges and the deferred-key arity.
    pub fn validate(&self) -> Result<(), ParamOutOfRange> {
        let checks: [(&'static str, Option<f64>, f64, f64); 4] = [
            ("temperature", self.temperature, 0.0, 2.0),
            ("top_p", self.top_p, 0.0, 1.0),
            ("frequency_penalty", self.frequency_penalty, -2.0, 2.0),
            ("presence_penalty", self.presence_penalty, -2.0, 2.0),
        ];
        for (param, value, min, max) in checks {
            if let Some(v) = value {
                if !(min..=max).contains(&v) {
                    return Err(ParamOutOfRange {
                        param,
                        value: v,
                        min,
                        max,
                    });
                }
            }
        }
        if let Some(ApiKey::Provider { arity, .. }) = &self.api_key {
            if *arity > 1 {
                return Err(ParamOutOfRange {
                    param: "api_key.arity",
                    value: f64::from(*arity),
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        Ok(())
    }
}

/// LLM configuration for one stage.
///
/// `client` and `tools` are registry names; resolution happens at
/// coordinator init (or spec deserialization), not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "LLMConfig", tag = "__struct__")]
pub struct LlmConfig {
    /// Provider model identifier (e.g. "gpt-4o-mini").
    pub model: String,
    /// Registry name of the LLM client implementation.
    pub client: String,
    #[serde(default)]
    pub params: LlmParams,
    /// Stage prompt; the worker appends its history and inputs around it.
    #[serde(default)]
    pub prompt_messages: Vec<Message>,
    /// Registry names of the tools this stage may call.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl LlmConfig {
    /// Creates a config with the given model and client and no extras.
    pub fn new(model: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            client: client.into(),
            params: LlmParams::default(),
            prompt_messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    /// Sets the prompt messages (builder).
    pub fn with_prompt(mut self, messages: Vec<Message>) -> Self {
        self.prompt_messages = messages;
        self
    }

    /// Adds a tool reference (builder).
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tools.push(name.into());
        self
    }

    /// Sets the params (builder).
    pub fn with_params(mut self, params: LlmParams) -> Self {
        self.params = params;
        self
    }
}
