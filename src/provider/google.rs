//! Google Gemini `streamGenerateContent` format.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::ColloquyError;
use crate::types::*;

use super::{CompletionRequest, ProviderAdapter, ProviderKind};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini never sends a role, so one is synthesized before the first
/// content. Function calls arrive whole and get a synthetic id.
#[derive(Debug, Default)]
pub struct GeminiAdapter {
    role_sent: bool,
    calls_emitted: u32,
}

impl GeminiAdapter {
    fn ensure_role(&mut self, events: &mut Vec<StreamEvent>) {
        if !self.role_sent {
            self.role_sent = true;
            events.push(StreamEvent::role(Role::Assistant));
        }
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn parse_frame(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ColloquyError> {
        // Requests always use `alt=sse`, so every frame is one JSON object.
        let value: Value = serde_json::from_str(payload.trim())?;
        let mut events = Vec::new();
        if let Some(error) = value.get("error") {
            events.push(StreamEvent::Error {
                error: error.clone(),
            });
            return Ok(events);
        }

        let response: GeminiStreamChunk = serde_json::from_value(value)?;
        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(ColloquyError::Protocol("gemini chunk has no candidates".into()));
        };

        self.ensure_role(&mut events);
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::content(text));
            }
            if let Some(call) = part.function_call {
                let index = self.calls_emitted;
                self.calls_emitted += 1;
                events.push(StreamEvent::tool_call(ToolCallDelta {
                    index,
                    id: Some(format!("call_{}", Uuid::new_v4().simple())),
                    name: Some(call.name),
                    arguments_fragment: Some(call.args.unwrap_or_else(|| json!({})).to_string()),
                }));
            }
        }

        if let Some(reason) = candidate.finish_reason {
            events.push(StreamEvent::finish(self.map_finish_reason(&reason)));
        }
        Ok(events)
    }
}

impl GeminiAdapter {
    fn map_finish_reason(&self, reason: &str) -> FinishReason {
        match reason {
            "STOP" if self.calls_emitted > 0 => FinishReason::ToolCalls,
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" => {
                FinishReason::ContentFilter
            }
            other => FinishReason::Other(other.to_lowercase()),
        }
    }
}

/// Streaming endpoint for a model.
pub fn stream_url(base_url: &str, model: &str, api_key: &str) -> String {
    format!("{base_url}/models/{model}:streamGenerateContent?alt=sse&key={api_key}")
}

/// `generateContent` request body.
pub fn build_request_body(request: &CompletionRequest) -> Value {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();
    // functionResponse needs the function name, which tool messages only
    // reference by call id.
    let mut call_names: HashMap<&str, &str> = HashMap::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => system_parts.push(json!({ "text": msg.text() })),
            Role::User => contents.push(json!({
                "role": "user",
                "parts": build_gemini_parts(msg),
            })),
            Role::Assistant => {
                for call in msg.tool_calls() {
                    call_names.insert(&call.id, &call.function_name);
                }
                contents.push(json!({
                    "role": "model",
                    "parts": build_gemini_parts(msg),
                }));
            }
            Role::Tool => {
                if let MessageContent::ToolResult(result) = &msg.content {
                    let name = call_names
                        .get(result.tool_call_id.as_str())
                        .copied()
                        .unwrap_or(result.tool_call_id.as_str());
                    contents.push(json!({
                        "role": "function",
                        "parts": [{
                            "functionResponse": {
                                "name": name,
                                "response": { "content": result.content },
                            }
                        }]
                    }));
                }
            }
        }
    }

    let mut body = Map::new();
    body.insert("contents".into(), contents.into());
    if !system_parts.is_empty() {
        body.insert("systemInstruction".into(), json!({ "parts": system_parts }));
    }

    let settings = &request.settings;
    let mut gen_config = Map::new();
    if let Some(max) = settings.max_tokens {
        gen_config.insert("maxOutputTokens".into(), max.into());
    }
    if let Some(temp) = settings.temperature {
        gen_config.insert("temperature".into(), temp.into());
    }
    if let Some(top_p) = settings.top_p {
        gen_config.insert("topP".into(), top_p.into());
    }
    if let Some(ref stops) = settings.stop_sequences {
        gen_config.insert("stopSequences".into(), json!(stops));
    }
    if !gen_config.is_empty() {
        body.insert("generationConfig".into(), Value::Object(gen_config));
    }

    if !request.tools.is_empty() {
        let fn_decls: Vec<Value> = request
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        body.insert("tools".into(), json!([{ "functionDeclarations": fn_decls }]));
    }

    Value::Object(body)
}

fn build_gemini_parts(msg: &Message) -> Vec<Value> {
    match &msg.content {
        MessageContent::Text(text) => vec![json!({ "text": text })],
        MessageContent::ToolResult(result) => vec![json!({ "text": result.content })],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(json!({ "text": text })),
                ContentPart::ImageUrl { url, .. } => Some(json!({
                    "fileData": { "fileUri": url }
                })),
                ContentPart::FunctionCall(call) => {
                    let args = serde_json::from_str::<Value>(&call.arguments_json)
                        .unwrap_or_else(|_| json!({}));
                    Some(json!({
                        "functionCall": { "name": call.function_name, "args": args }
                    }))
                }
                ContentPart::ExecutionOutput(out) => Some(json!({ "text": out.output })),
            })
            .collect(),
    }
}

#[derive(Deserialize)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_is_synthesized_once() {
        let mut adapter = GeminiAdapter::default();
        let first = adapter
            .parse_frame(r#"{"candidates":[{"content":{"parts":[{"text":"a"}]}}]}"#)
            .unwrap();
        let second = adapter
            .parse_frame(r#"{"candidates":[{"content":{"parts":[{"text":"b"}]}}]}"#)
            .unwrap();

        assert_eq!(first, vec![StreamEvent::role(Role::Assistant), StreamEvent::content("a")]);
        assert_eq!(second, vec![StreamEvent::content("b")]);
    }

    #[test]
    fn frames_are_single_sse_objects() {
        assert_eq!(
            stream_url("https://g.test/v1beta", "gemini-1.5-flash", "k"),
            "https://g.test/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse&key=k"
        );

        let mut adapter = GeminiAdapter::default();
        assert!(adapter.parse_frame("]").is_err());
    }

    #[test]
    fn function_call_becomes_tool_call_delta() {
        let mut adapter = GeminiAdapter::default();
        let events = adapter
            .parse_frame(
                r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"clock","args":{"tz":"UTC"}}}]},"finishReason":"STOP"}]}"#,
            )
            .unwrap();

        let StreamEvent::ToolCallDelta { delta, .. } = &events[1] else {
            panic!("expected tool call delta, got {:?}", events[1]);
        };
        assert_eq!(delta.index, 0);
        assert_eq!(delta.name.as_deref(), Some("clock"));
        assert_eq!(delta.arguments_fragment.as_deref(), Some(r#"{"tz":"UTC"}"#));
        assert!(delta.id.as_deref().unwrap().starts_with("call_"));
        assert_eq!(events[2], StreamEvent::finish(FinishReason::ToolCalls));
    }

    #[test]
    fn finish_reasons_map_to_canonical() {
        let adapter = GeminiAdapter::default();
        assert_eq!(adapter.map_finish_reason("STOP"), FinishReason::Stop);
        assert_eq!(adapter.map_finish_reason("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(adapter.map_finish_reason("SAFETY"), FinishReason::ContentFilter);
    }

    #[test]
    fn error_object_is_propagated_verbatim() {
        let mut adapter = GeminiAdapter::default();
        let events = adapter
            .parse_frame(r#"{"error":{"code":429,"message":"quota"}}"#)
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                error: json!({ "code": 429, "message": "quota" })
            }]
        );
    }

    #[test]
    fn request_body_maps_roles_and_function_responses() {
        let request = CompletionRequest {
            model: "gemini-2.0-flash".into(),
            messages: vec![
                Message::system("be brief"),
                Message::user("time?"),
                Message::assistant_parts(vec![ContentPart::FunctionCall(ToolCall {
                    id: "call_9".into(),
                    function_name: "clock".into(),
                    arguments_json: "{}".into(),
                })]),
                Message::tool_result(ToolCallResult {
                    tool_call_id: "call_9".into(),
                    content: "noon".into(),
                    is_error: false,
                }),
            ],
            tools: Vec::new(),
            settings: GenerationSettings::default(),
        };

        let body = build_request_body(&request);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], json!("be brief"));
        assert_eq!(body["contents"][1]["role"], json!("model"));
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["name"],
            json!("clock")
        );
        assert!(body.get("tools").is_none());
    }
}
