//! Shared test helpers: a scripted backend and closure-driven tools.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use colloquy::error::ColloquyError;
use colloquy::provider::{CompletionBackend, CompletionRequest, EventStream, ProviderKind};
use colloquy::tools::{HttpMethod, Tool, ToolDispatcher, ToolInvoker};
use colloquy::turn::{TurnEvent, TurnEventSink, TurnOptions, TurnOrchestrator};
use colloquy::types::stream::ToolCallDelta;
use colloquy::types::{FinishReason, Role, StreamEvent};

struct Script {
    events: Vec<StreamEvent>,
    hang: bool,
}

/// A backend that replays queued event scripts, one per request.
#[derive(Default)]
pub struct MockBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response stream.
    pub fn queue(&self, events: Vec<StreamEvent>) {
        self.scripts.lock().unwrap().push_back(Script {
            events,
            hang: false,
        });
    }

    /// Queue a response that yields `events` and then never ends.
    pub fn queue_hanging(&self, events: Vec<StreamEvent>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script { events, hang: true });
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<EventStream, ColloquyError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ColloquyError::InvalidState("no scripted response left".into()))?;

        let replay = futures::stream::iter(script.events.into_iter().map(Ok));
        if script.hang {
            Ok(replay.chain(futures::stream::pending()).boxed())
        } else {
            Ok(replay.boxed())
        }
    }
}

/// Tool invoker backed by a plain closure over `(tool, arguments_json)`.
pub struct FnInvoker<F>(pub F);

#[async_trait]
impl<F> ToolInvoker for FnInvoker<F>
where
    F: Fn(&Tool, &str) -> Result<String, ColloquyError> + Send + Sync,
{
    async fn invoke(&self, tool: &Tool, arguments_json: &str) -> Result<String, ColloquyError> {
        (self.0)(tool, arguments_json)
    }
}

/// Wrap a closure as a shared invoker.
pub fn invoker<F>(f: F) -> Arc<dyn ToolInvoker>
where
    F: Fn(&Tool, &str) -> Result<String, ColloquyError> + Send + Sync + 'static,
{
    Arc::new(FnInvoker(f))
}

/// Invoker whose calls never complete.
pub struct HangingInvoker;

#[async_trait]
impl ToolInvoker for HangingInvoker {
    async fn invoke(&self, _tool: &Tool, _arguments_json: &str) -> Result<String, ColloquyError> {
        futures::future::pending().await
    }
}

/// Tool accepting any object.
pub fn tool(name: &str) -> Tool {
    Tool::new(
        name,
        format!("http://tools.invalid/{name}"),
        HttpMethod::Post,
        serde_json::json!({ "type": "object" }),
    )
}

/// Orchestrator over `backend` and `invoker` with no continuation delay.
pub fn orchestrator(
    backend: Arc<MockBackend>,
    invoker: Arc<dyn ToolInvoker>,
) -> TurnOrchestrator {
    TurnOrchestrator::new(
        backend,
        ToolDispatcher::new(invoker),
        TurnOptions::builder()
            .model("test-model")
            .continuation_delay(Duration::ZERO)
            .build(),
    )
}

/// A complete text answer.
pub fn text_reply(text: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::role(Role::Assistant),
        StreamEvent::content(text),
        StreamEvent::finish(FinishReason::Stop),
        StreamEvent::Done,
    ]
}

/// An answer requesting `(id, name, arguments)` tool calls.
pub fn tool_reply(calls: &[(&str, &str, &str)]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::role(Role::Assistant)];
    for (index, (id, name, arguments)) in calls.iter().enumerate() {
        events.push(StreamEvent::tool_call(ToolCallDelta {
            index: index as u32,
            id: Some((*id).to_string()),
            name: Some((*name).to_string()),
            arguments_fragment: Some((*arguments).to_string()),
        }));
    }
    events.push(StreamEvent::finish(FinishReason::ToolCalls));
    events.push(StreamEvent::Done);
    events
}

/// Sink that records every event it receives.
pub fn recording_sink() -> (TurnEventSink, Arc<Mutex<Vec<TurnEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let sink: TurnEventSink = Arc::new(move |event: TurnEvent| recorded.lock().unwrap().push(event));
    (sink, events)
}
