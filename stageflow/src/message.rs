//! Message and message-part types shared by stage prompts, worker history,
//! and the LLM client seam.
//!
//! A [`Message`] is a role plus a list of tagged [`MessagePart`] variants.
//! Parts carry their variant tag (`__struct__`) in JSON form, so the same
//! shape is used for in-memory matching and for persisted agent specs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message in a stage conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt; typically first in a stage's prompt list.
    System,
    /// User input or synthetic user-role turns (function results, errors).
    User,
    /// Model output, including function-call turns.
    Assistant,
}

/// A single tagged content part of a [`Message`].
///
/// The `__struct__` tag identifies the variant both in memory and in the
/// persisted JSON form of an agent spec.
///
/// **Interaction**: Produced by stage authors (prompt messages), by the
/// LLM client seam ([`crate::llm::LlmResponse`]), and by the stage worker
/// when it appends function-call / function-result turns to its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__struct__")]
pub enum MessagePart {
    /// Plain text content.
    Text { text: String },
    /// A file attachment: either inline bytes (base64 in JSON) or a URI.
    File {
        #[serde(default, with = "b64_bytes", skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Structured data content (arbitrary JSON).
    Data { data: Value },
    /// A function call issued by the model.
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        args: Value,
    },
    /// The result of a function call, fed back to the model as a user turn.
    FunctionResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        name: String,
        result: Value,
    },
    /// An opaque reasoning signature from providers that emit thought parts.
    Thought {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

impl MessagePart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a structured data part.
    pub fn data(data: Value) -> Self {
        Self::Data { data }
    }

    /// Creates a function-call part.
    pub fn function_call(id: Option<String>, name: impl Into<String>, args: Value) -> Self {
        Self::FunctionCall {
            id,
            name: name.into(),
            args,
        }
    }

    /// Creates a function-result part.
    pub fn function_result(id: Option<String>, name: impl Into<String>, result: Value) -> Self {
        Self::FunctionResult {
            id,
            name: name.into(),
            result,
        }
    }

    /// Returns the text content when this is a `Text` part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Base64 (de)serialization for optional binary file payloads.
mod b64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => ser.serialize_str(&STANDARD.encode(b)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(de)?;
        match encoded {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// A message in a stage conversation: role plus content parts.
///
/// **Interaction**: Stage prompt messages live in
/// [`LlmConfig::prompt_messages`](crate::spec::LlmConfig); the stage worker
/// accumulates its private history as a `Vec<Message>` and hands the full
/// list to [`LlmClient::completion`](crate::llm::LlmClient::completion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// Creates a message with the given role and parts.
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self { role, parts }
    }

    /// Creates a system message with one text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![MessagePart::text(text)])
    }

    /// Creates a user message with one text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![MessagePart::text(text)])
    }

    /// Creates an assistant message with one text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![MessagePart::text(text)])
    }

    /// Creates a user message carrying a single arbitrary part.
    pub fn user_part(part: MessagePart) -> Self {
        Self::new(Role::User, vec![part])
    }

    /// Creates an assistant message carrying a single arbitrary part.
    pub fn assistant_part(part: MessagePart) -> Self {
        Self::new(Role::Assistant, vec![part])
    }

    /// Returns the first text part's content, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| p.as_text())
    }

    /// Returns all function-call parts in this message.
    pub fn function_calls(&self) -> Vec<&MessagePart> {
        self.parts
            .iter()
            .filter(|p| matches!(p, MessagePart::FunctionCall { .. }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Constructors produce the expected role and a single text part.
    #[test]
    fn message_constructors_set_role_and_text() {
        let sys = Message::system("s");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.first_text(), Some("s"));
        let usr = Message::user("u");
        assert_eq!(usr.role, Role::User);
        let ast = Message::assistant("a");
        assert_eq!(ast.role, Role::Assistant);
        assert_eq!(ast.first_text(), Some("a"));
    }

    /// **Scenario**: Each part variant round-trips through serde with its `__struct__` tag.
    #[test]
    fn message_part_roundtrip_with_struct_tag() {
        let parts = vec![
            MessagePart::text("hello"),
            MessagePart::File {
                bytes: Some(vec![1, 2, 3]),
                uri: None,
                mime: Some("application/octet-stream".into()),
                name: Some("blob.bin".into()),
            },
            MessagePart::data(serde_json::json!({"k": 1})),
            MessagePart::function_call(Some("call-1".into()), "echo", serde_json::json!({"s": "hi"})),
            MessagePart::function_result(Some("call-1".into()), "echo", serde_json::json!("hi")),
            MessagePart::Thought {
                signature: Some("sig".into()),
            },
        ];
        for part in parts {
            let json = serde_json::to_value(&part).expect("serialize");
            assert!(
                json.get("__struct__").is_some(),
                "part should carry a __struct__ tag: {}",
                json
            );
            let back: MessagePart = serde_json::from_value(json).expect("deserialize");
            assert_eq!(part, back);
        }
    }

    /// **Scenario**: File bytes serialize as base64 text, not a JSON array.
    #[test]
    fn file_bytes_serialize_as_base64() {
        let part = MessagePart::File {
            bytes: Some(b"stage".to_vec()),
            uri: None,
            mime: None,
            name: None,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["bytes"], serde_json::json!("c3RhZ2U="));
        let back: MessagePart = serde_json::from_value(json).unwrap();
        assert_eq!(part, back);
    }

    /// **Scenario**: function_calls returns only FunctionCall parts.
    #[test]
    fn function_calls_filters_parts() {
        let msg = Message::new(
            Role::Assistant,
            vec![
                MessagePart::text("calling"),
                MessagePart::function_call(None, "echo", serde_json::json!({})),
            ],
        );
        let calls = msg.function_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], MessagePart::FunctionCall { name, .. } if name == "echo"));
    }
}
