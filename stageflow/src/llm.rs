//! LLM client abstraction for stage workers.
//!
//! A stage worker calls [`LlmClient::completion`] with the stage's model,
//! accumulated messages, declared tool specs, and validated params; the
//! response is either final content or one or more function calls that
//! drive the worker's tool loop. Concrete HTTP providers implement this
//! trait outside the core; [`MockLlm`] ships for tests and examples.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::message::{Message, MessagePart};
use crate::spec::LlmParams;
use crate::tool::ToolSpec;

/// Errors from an LLM client.
///
/// **Interaction**: Returned by [`LlmClient::completion`]; the stage
/// worker reports it to the coordinator as a failed stage with the
/// pre-call history preserved.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The provider call failed (network, auth, rate limit).
    #[error("llm request failed: {0}")]
    Request(String),
    /// The provider returned something the client could not interpret.
    #[error("invalid llm response: {0}")]
    InvalidResponse(String),
}

/// One LLM completion: final content or function calls.
///
/// **Interaction**: Consumed by the stage worker's interaction loop;
/// [`LlmResponse::function_calls`] drives tool rounds, everything else is
/// final stage content.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse {
    /// Plain text reply.
    Text(String),
    /// Structured reply (e.g. when a response schema was requested).
    Structured(Value),
    /// One function call issued by the model.
    FunctionCall {
        id: Option<String>,
        name: String,
        args: Value,
    },
    /// A full list of message parts (may mix text and function calls).
    Parts(Vec<MessagePart>),
}

impl LlmResponse {
    /// Returns the function-call parts of this response, if any.
    pub fn function_calls(&self) -> Vec<MessagePart> {
        match self {
            Self::FunctionCall { id, name, args } => vec![MessagePart::function_call(
                id.clone(),
                name.clone(),
                args.clone(),
            )],
            Self::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, MessagePart::FunctionCall { .. }))
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Converts the response into message parts for the assistant turn.
    pub fn to_parts(&self) -> Vec<MessagePart> {
        match self {
            Self::Text(text) => vec![MessagePart::text(text.clone())],
            Self::Structured(value) => vec![MessagePart::data(value.clone())],
            Self::FunctionCall { id, name, args } => vec![MessagePart::function_call(
                id.clone(),
                name.clone(),
                args.clone(),
            )],
            Self::Parts(parts) => parts.clone(),
        }
    }

    /// Converts final content into the stage result value.
    pub fn into_result_value(self) -> Value {
        match self {
            Self::Text(text) => Value::String(text),
            Self::Structured(value) => value,
            Self::FunctionCall { id, name, args } => {
                serde_json::to_value(MessagePart::function_call(id, name, args))
                    .unwrap_or(Value::Null)
            }
            Self::Parts(parts) => serde_json::to_value(parts).unwrap_or(Value::Null),
        }
    }
}

/// LLM client capability: one completion per call.
///
/// Implementations are registered by name in the
/// [`Registry`](crate::registry::Registry) and referenced from stage
/// specs via `LlmConfig::client`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one completion over the given messages.
    async fn completion(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &LlmParams,
    ) -> Result<LlmResponse, LlmError>;
}

/// Scripted mock LLM for tests and examples.
///
/// Pops one scripted response per [`completion`](LlmClient::completion)
/// call; when the script runs dry it repeats the last response (or
/// returns empty text if no script was given). Records the number of
/// calls and the last message list it saw.
pub struct MockLlm {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    last: Mutex<Option<Result<LlmResponse, LlmError>>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<Message>>,
}

impl MockLlm {
    /// Creates a mock that replies with the given scripted responses in order.
    pub fn scripted(responses: Vec<LlmResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock that always replies with the given text.
    pub fn text(content: impl Into<String>) -> Self {
        Self::scripted(vec![LlmResponse::Text(content.into())])
    }

    /// Creates a mock whose first call returns one function call and whose
    /// second call returns the given text.
    pub fn call_then_text(
        tool: impl Into<String>,
        args: Value,
        content: impl Into<String>,
    ) -> Self {
        Self::scripted(vec![
            LlmResponse::FunctionCall {
                id: Some("call-1".into()),
                name: tool.into(),
                args,
            },
            LlmResponse::Text(content.into()),
        ])
    }

    /// Creates a mock whose first call fails with a request error and
    /// whose second call returns the given text. Used for retry tests.
    pub fn fail_then_text(reason: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([
                Err(LlmError::Request(reason.into())),
                Ok(LlmResponse::Text(content.into())),
            ])),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock that always fails with the given request error.
    pub fn failing(reason: impl Into<String>) -> Self {
        let err = LlmError::Request(reason.into());
        Self {
            script: Mutex::new(VecDeque::from([Err(err.clone())])),
            last: Mutex::new(Some(Err(err))),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Appends a scripted error response.
    pub fn push_error(&self, err: LlmError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    /// Number of completion calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The message list passed to the most recent completion call.
    pub fn last_messages(&self) -> Vec<Message> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn completion(
        &self,
        _model: &str,
        messages: &[Message],
        _tools: &[ToolSpec],
        _params: &LlmParams,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(response) => {
                *self.last.lock().unwrap() = Some(response.clone());
                response
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Ok(LlmResponse::Text(String::new()))),
        }
    }
}
