//! Worker runtime format: newline-delimited records carrying one `response`
//! text fragment each.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ColloquyError;
use crate::types::*;

use super::{CompletionRequest, ProviderAdapter, ProviderKind};

#[derive(Debug, Default)]
pub struct WorkerAdapter {
    role_sent: bool,
}

#[derive(Deserialize)]
struct WorkerRecord {
    response: Option<String>,
    error: Option<Value>,
}

impl ProviderAdapter for WorkerAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Worker
    }

    fn parse_frame(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ColloquyError> {
        let record: WorkerRecord = serde_json::from_str(payload)?;
        if let Some(error) = record.error {
            return Ok(vec![StreamEvent::Error { error }]);
        }
        let Some(text) = record.response else {
            return Ok(Vec::new());
        };

        let mut events = Vec::with_capacity(2);
        if !self.role_sent {
            self.role_sent = true;
            events.push(StreamEvent::role(Role::Assistant));
        }
        events.push(StreamEvent::content(text));
        Ok(events)
    }
}

/// Worker request body: flattened text history with streaming on.
pub fn build_request_body(request: &CompletionRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|msg| {
            json!({
                "role": msg.role,
                "content": msg.text(),
            })
        })
        .collect();

    let mut body = json!({
        "messages": messages,
        "stream": true,
    });
    if let Some(max) = request.settings.max_tokens {
        body["max_tokens"] = max.into();
    }
    if let Some(temp) = request.settings.temperature {
        body["temperature"] = temp.into();
    }
    body
}
