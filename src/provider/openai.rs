//! OpenAI Chat Completions streaming format. Already canonical, so the
//! adapter only re-frames chunks into events.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ColloquyError;
use crate::types::*;

use super::{CompletionRequest, ProviderAdapter, ProviderKind};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Pass-through adapter for OpenAI-style chunks.
#[derive(Debug, Default)]
pub struct NativeAdapter;

impl ProviderAdapter for NativeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn parse_frame(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ColloquyError> {
        let value: Value = serde_json::from_str(payload)?;
        if let Some(error) = value.get("error") {
            return Ok(vec![StreamEvent::Error {
                error: error.clone(),
            }]);
        }

        let chunk: OpenAiStreamChunk = serde_json::from_value(value)?;
        let mut events = Vec::new();
        for choice in chunk.choices {
            let index = choice.index;
            if let Some(role) = choice.delta.role.as_deref().and_then(|r| r.parse().ok()) {
                events.push(StreamEvent::Role {
                    choice: index,
                    role,
                });
            }
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::ContentDelta {
                    choice: index,
                    text,
                });
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                events.push(StreamEvent::ToolCallDelta {
                    choice: index,
                    delta: ToolCallDelta {
                        index: call.index,
                        id: call.id,
                        name,
                        arguments_fragment: arguments,
                    },
                });
            }
            if let Some(reason) = choice.finish_reason {
                events.push(StreamEvent::FinishReason {
                    choice: index,
                    reason: reason.parse().unwrap_or_else(|never| match never {}),
                });
            }
        }
        Ok(events)
    }
}

/// Chat Completions request body with streaming enabled.
pub fn build_request_body(request: &CompletionRequest) -> Value {
    let messages: Vec<Value> = request.messages.iter().map(message_to_openai).collect();

    let mut body = Map::new();
    body.insert("model".into(), request.model.clone().into());
    body.insert("messages".into(), messages.into());
    body.insert("stream".into(), true.into());

    let settings = &request.settings;
    if let Some(max) = settings.max_tokens {
        body.insert("max_tokens".into(), max.into());
    }
    if let Some(temp) = settings.temperature {
        body.insert("temperature".into(), temp.into());
    }
    if let Some(top_p) = settings.top_p {
        body.insert("top_p".into(), top_p.into());
    }
    if let Some(ref stops) = settings.stop_sequences {
        body.insert("stop".into(), json!(stops));
    }

    if !request.tools.is_empty() {
        let tool_defs: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body.insert("tools".into(), tool_defs.into());
    }

    Value::Object(body)
}

fn message_to_openai(msg: &Message) -> Value {
    let role = msg.role.to_string();
    match &msg.content {
        MessageContent::Text(text) => json!({ "role": role, "content": text }),
        MessageContent::ToolResult(result) => json!({
            "role": "tool",
            "tool_call_id": result.tool_call_id,
            "content": result.content,
        }),
        MessageContent::Parts(parts) => {
            let calls = msg.tool_calls();
            if !calls.is_empty() {
                let tool_calls: Vec<Value> = calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.function_name,
                                "arguments": call.arguments_json,
                            }
                        })
                    })
                    .collect();
                let text = msg.text();
                return json!({
                    "role": role,
                    "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                    "tool_calls": tool_calls,
                });
            }

            let content: Vec<Value> = parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(json!({ "type": "text", "text": text })),
                    ContentPart::ImageUrl { url, detail } => {
                        let mut image = json!({ "url": url });
                        if let Some(detail) = detail {
                            image["detail"] = Value::String(detail.clone());
                        }
                        Some(json!({ "type": "image_url", "image_url": image }))
                    }
                    ContentPart::ExecutionOutput(out) => {
                        Some(json!({ "type": "text", "text": out.output }))
                    }
                    ContentPart::FunctionCall(_) => None,
                })
                .collect();
            json!({ "role": role, "content": content })
        }
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    role: Option<String>,
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
