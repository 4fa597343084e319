//! Message types exchanged with model backends and tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub create_time: DateTime<Utc>,
}

impl Message {
    fn with_content(role: Role, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            create_time: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_content(Role::System, MessageContent::Text(text.into()))
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_content(Role::User, MessageContent::Text(text.into()))
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, MessageContent::Text(text.into()))
    }

    /// Create an assistant message from typed parts.
    pub fn assistant_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_content(Role::Assistant, MessageContent::Parts(parts))
    }

    /// Create a user message from typed parts (e.g. text plus images).
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_content(Role::User, MessageContent::Parts(parts))
    }

    /// Create a tool message answering exactly one tool call.
    pub fn tool_result(result: ToolCallResult) -> Self {
        Self::with_content(Role::Tool, MessageContent::ToolResult(result))
    }

    /// Concatenated text content. Tool results contribute their output.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            MessageContent::ToolResult(result) => result.content.clone(),
        }
    }

    /// Tool calls carried by this message, in authored order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        match &self.content {
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::FunctionCall(call) => Some(call),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The tool call this message answers, if it is a tool message.
    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.content {
            MessageContent::ToolResult(result) => Some(&result.tool_call_id),
            _ => None,
        }
    }
}

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message body: plain text, typed parts, or a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    ToolResult(ToolCallResult),
}

/// A single self-describing part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    FunctionCall(ToolCall),
    ExecutionOutput(ExecutionOutput),
}

/// A tool call requested by the model. Arguments stay opaque until the
/// matched tool executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    pub arguments_json: String,
}

/// Output of a code execution, embedded as a message part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Content of a tool message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_only_text_parts() {
        let message = Message::assistant_parts(vec![
            ContentPart::Text { text: "a".into() },
            ContentPart::FunctionCall(ToolCall {
                id: "c1".into(),
                function_name: "lookup".into(),
                arguments_json: "{}".into(),
            }),
            ContentPart::Text { text: "b".into() },
        ]);

        assert_eq!(message.text(), "ab");
        assert_eq!(message.tool_calls().len(), 1);
    }

    #[test]
    fn tool_message_references_its_call() {
        let message = Message::tool_result(ToolCallResult {
            tool_call_id: "call_7".into(),
            content: "ok".into(),
            is_error: false,
        });

        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id(), Some("call_7"));
    }

    #[test]
    fn parts_serialize_with_type_tags() {
        let part = ContentPart::ImageUrl {
            url: "https://example.com/cat.png".into(),
            detail: None,
        };

        let value = serde_json::to_value(&part).unwrap();

        assert_eq!(value["type"], "imageUrl");
        assert_eq!(value["url"], "https://example.com/cat.png");
    }
}
