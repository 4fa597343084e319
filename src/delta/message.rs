//! In-progress assistant message built from canonical stream events.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::types::{ContentPart, FinishReason, Message, Role, StreamEvent, ToolCall};

use super::{check, merge, Assembled, DeltaError};

/// Accumulator for one streamed completion, keyed by choice index.
///
/// Every completion chunk's `choices` list is folded with the generic
/// [`apply`](super::apply) algorithm, so tool-call fragments merge by their own `index`
/// exactly like choices do.
#[derive(Debug, Clone, Default)]
pub struct PartialAssistantMessage {
    choices: Option<Assembled>,
}

/// Typed view of one choice's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialChoice {
    pub index: usize,
    pub role: Option<Role>,
    pub content: String,
    pub tool_calls: Vec<PartialToolCall>,
    pub finish_reason: Option<FinishReason>,
}

/// A tool call still being streamed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialToolCall {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl PartialAssistantMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a completion chunk (`{"choices":[{"index":..,"delta":{..}}]}`).
    pub fn apply_chunk(&mut self, chunk: &Value) -> Result<(), DeltaError> {
        let Some(choices) = chunk.get("choices") else {
            return Ok(());
        };
        self.fold(choices)
    }

    /// Fold one canonical event. Returns whether the visible message changed.
    pub fn apply_event(&mut self, event: &StreamEvent) -> Result<bool, DeltaError> {
        match event {
            StreamEvent::ContentDelta { text, .. } if text.is_empty() => return Ok(false),
            StreamEvent::Role { choice, role } => {
                let current = self
                    .delta_field(*choice as usize, "role")
                    .and_then(Assembled::as_str);
                if current == Some(role.to_string().as_str()) {
                    return Ok(false);
                }
            }
            StreamEvent::FinishReason { choice, .. } => {
                let finished = self
                    .slot(*choice as usize)
                    .and_then(|entry| entry.get("finish_reason"))
                    .is_some_and(|reason| !reason.is_null());
                if finished {
                    return Ok(false);
                }
            }
            _ => {}
        }
        let Some(chunk) = event.to_chunk() else {
            return Ok(false);
        };
        self.fold(&chunk["choices"])?;
        Ok(true)
    }

    /// Merge a `choices` patch list. `role` and `finish_reason` are
    /// discriminators: a new value replaces the old one instead of appending.
    fn fold(&mut self, choices: &Value) -> Result<(), DeltaError> {
        check(choices)?;
        if let (Some(acc), Value::Array(patches)) = (self.choices.as_mut(), choices) {
            for patch in patches {
                let Some(index) = patch
                    .get("index")
                    .and_then(Value::as_u64)
                    .and_then(|index| usize::try_from(index).ok())
                else {
                    continue;
                };
                let Some(entry) = acc.at_mut(index) else {
                    continue;
                };
                if patch.pointer("/delta/role").is_some_and(Value::is_string) {
                    if let Some(delta) = entry.get_mut("delta") {
                        delta.remove("role");
                    }
                }
                if patch.get("finish_reason").is_some_and(Value::is_string) {
                    entry.remove("finish_reason");
                }
            }
        }
        self.choices = Some(merge(self.choices.take(), choices));
        Ok(())
    }

    fn slot(&self, index: usize) -> Option<&Assembled> {
        self.choices.as_ref()?.at(index)
    }

    fn delta_field(&self, index: usize, key: &str) -> Option<&Assembled> {
        self.slot(index)?.get("delta")?.get(key)
    }

    /// Whether the backend produced at least one choice.
    pub fn has_choices(&self) -> bool {
        self.choices
            .as_ref()
            .and_then(Assembled::as_list)
            .is_some_and(|items| items.iter().any(Option::is_some))
    }

    /// Snapshot of one choice.
    pub fn choice(&self, index: usize) -> Option<PartialChoice> {
        let entry = self.choices.as_ref()?.at(index)?;
        Some(read_choice(index, entry))
    }

    /// Snapshots of every present choice, in index order.
    pub fn choices(&self) -> Vec<PartialChoice> {
        let Some(items) = self.choices.as_ref().and_then(Assembled::as_list) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|entry| read_choice(index, entry)))
            .collect()
    }

    /// Whether every present choice has reported a finish reason.
    pub fn is_finished(&self) -> bool {
        let choices = self.choices();
        !choices.is_empty() && choices.iter().all(|c| c.finish_reason.is_some())
    }

    /// Freeze a choice into a committed assistant message.
    pub fn finalize(&self, index: usize) -> Option<FinalizedMessage> {
        let choice = self.choice(index)?;
        let tool_calls: Vec<ToolCall> = choice
            .tool_calls
            .iter()
            .map(|call| ToolCall {
                id: call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                function_name: call.name.clone().unwrap_or_default(),
                arguments_json: call.arguments.clone(),
            })
            .collect();

        let message = if tool_calls.is_empty() {
            Message::assistant(choice.content)
        } else {
            let mut parts = Vec::with_capacity(tool_calls.len() + 1);
            if !choice.content.is_empty() {
                parts.push(ContentPart::Text {
                    text: choice.content,
                });
            }
            parts.extend(tool_calls.into_iter().map(ContentPart::FunctionCall));
            Message::assistant_parts(parts)
        };

        Some(FinalizedMessage {
            message,
            finish_reason: choice.finish_reason,
        })
    }
}

/// A completed assistant message and the reason its stream ended.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedMessage {
    pub message: Message,
    pub finish_reason: Option<FinishReason>,
}

impl FinalizedMessage {
    /// Whether the model requested tool calls, either by finish reason or by
    /// emitting calls outright.
    pub fn requests_tools(&self) -> bool {
        !self.message.tool_calls().is_empty()
            || self
                .finish_reason
                .as_ref()
                .is_some_and(FinishReason::requests_tools)
    }
}

fn read_choice(index: usize, entry: &Assembled) -> PartialChoice {
    let delta = entry.get("delta");
    let field = |key: &str| delta.and_then(|d| d.get(key)).and_then(Assembled::as_str);

    let tool_calls = delta
        .and_then(|d| d.get("tool_calls"))
        .and_then(Assembled::as_list)
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| {
                    let call = slot.as_ref()?;
                    let function = call.get("function");
                    Some(PartialToolCall {
                        index,
                        id: call.get("id").and_then(Assembled::as_str).map(str::to_string),
                        name: function
                            .and_then(|f| f.get("name"))
                            .and_then(Assembled::as_str)
                            .map(str::to_string),
                        arguments: function
                            .and_then(|f| f.get("arguments"))
                            .and_then(Assembled::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    PartialChoice {
        index,
        role: field("role").and_then(|r| r.parse().ok()),
        content: field("content").unwrap_or_default().to_string(),
        tool_calls,
        finish_reason: entry
            .get("finish_reason")
            .and_then(Assembled::as_str)
            .map(|r| r.parse().unwrap_or_else(|never| match never {})),
    }
}
