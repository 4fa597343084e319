//! Canonical stream events and their wire encoding.
//!
//! Every provider adapter normalizes its backend's stream into
//! [`StreamEvent`]s. On the wire each event is one SSE frame:
//! `data: {"choices":[{"index":0,"delta":{...}}]}\n\n`, and the stream ends
//! with `data: [DONE]\n\n`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::generation::FinishReason;
use super::message::Role;

/// End-of-stream sentinel payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A backend-agnostic stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Role {
        choice: u32,
        role: Role,
    },
    ContentDelta {
        choice: u32,
        text: String,
    },
    ToolCallDelta {
        choice: u32,
        delta: ToolCallDelta,
    },
    FinishReason {
        choice: u32,
        reason: FinishReason,
    },
    /// Backend-reported error, forwarded verbatim.
    Error {
        error: Value,
    },
    Done,
}

/// Fragment of a tool call, merged by `index` into the in-progress call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments_fragment: Option<String>,
}

impl StreamEvent {
    /// Role event for the first choice.
    pub fn role(role: Role) -> Self {
        Self::Role { choice: 0, role }
    }

    /// Content fragment for the first choice.
    pub fn content(text: impl Into<String>) -> Self {
        Self::ContentDelta {
            choice: 0,
            text: text.into(),
        }
    }

    /// Tool-call fragment for the first choice.
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self::ToolCallDelta { choice: 0, delta }
    }

    /// Finish reason for the first choice.
    pub fn finish(reason: FinishReason) -> Self {
        Self::FinishReason { choice: 0, reason }
    }

    /// The completion chunk this event corresponds to, in the shape the
    /// delta assembler consumes. `Done` and `Error` carry no chunk.
    pub fn to_chunk(&self) -> Option<Value> {
        let (choice, delta, finish_reason) = match self {
            Self::Role { choice, role } => (*choice, json!({ "role": role }), None),
            Self::ContentDelta { choice, text } => (*choice, json!({ "content": text }), None),
            Self::ToolCallDelta { choice, delta } => {
                let mut call = Map::new();
                call.insert("index".into(), delta.index.into());
                if let Some(id) = &delta.id {
                    call.insert("id".into(), id.clone().into());
                }
                let mut function = Map::new();
                if let Some(name) = &delta.name {
                    function.insert("name".into(), name.clone().into());
                }
                if let Some(arguments) = &delta.arguments_fragment {
                    function.insert("arguments".into(), arguments.clone().into());
                }
                if !function.is_empty() {
                    call.insert("function".into(), Value::Object(function));
                }
                (*choice, json!({ "tool_calls": [call] }), None)
            }
            Self::FinishReason { choice, reason } => (*choice, json!({}), Some(reason)),
            Self::Error { .. } | Self::Done => return None,
        };

        let mut entry = json!({ "index": choice, "delta": delta });
        if let Some(reason) = finish_reason {
            entry["finish_reason"] = Value::String(reason.to_string());
        }
        Some(json!({ "choices": [entry] }))
    }

    /// Render this event as one canonical SSE frame.
    pub fn to_wire_frame(&self) -> String {
        match self {
            Self::Done => format!("data: {DONE_SENTINEL}\n\n"),
            Self::Error { error } => format!("data: {}\n\n", json!({ "error": error })),
            other => match other.to_chunk() {
                Some(chunk) => format!("data: {chunk}\n\n"),
                None => String::new(),
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
