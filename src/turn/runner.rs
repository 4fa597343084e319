//! Turn orchestration: request, stream, dispatch tools, continue.

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{
    ChatConfig, DEFAULT_CONTINUATION_DELAY_MS, DEFAULT_CONTINUATION_THRESHOLD,
    DEFAULT_MAX_CONTINUATIONS,
};
use crate::delta::message::FinalizedMessage;
use crate::delta::PartialAssistantMessage;
use crate::error::ColloquyError;
use crate::memory::{HttpMemorySource, MemorySource};
use crate::provider::{CompletionBackend, CompletionRequest, HttpBackend};
use crate::tools::{allows_continuation, HttpToolInvoker, ToolDispatcher, ToolRegistry};
use crate::types::{GenerationSettings, Message, StreamEvent, ToolCall};

use super::events::{TurnEmitter, TurnEventPayload, TurnEventSink};
use super::prompt::assemble_messages;
use super::types::{TurnHandle, TurnId, TurnOutcome, TurnState};

/// Per-orchestrator request settings.
#[derive(Debug, Clone, Builder)]
pub struct TurnOptions {
    #[builder(into)]
    pub model: String,
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub settings: GenerationSettings,
    #[builder(default = DEFAULT_CONTINUATION_THRESHOLD)]
    pub continuation_threshold: usize,
    #[builder(default = Duration::from_millis(DEFAULT_CONTINUATION_DELAY_MS))]
    pub continuation_delay: Duration,
    #[builder(default = DEFAULT_MAX_CONTINUATIONS)]
    pub max_continuations: u32,
}

impl TurnOptions {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            settings: config.settings.clone(),
            continuation_threshold: config.continuation_threshold,
            continuation_delay: config.continuation_delay(),
            max_continuations: config.max_continuations,
        }
    }
}

/// Input for one turn.
#[derive(Clone)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub history: Vec<Message>,
    /// Snapshot used for the whole turn, continuations included.
    pub tools: ToolRegistry,
    pub event_sink: Option<TurnEventSink>,
}

impl TurnRequest {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            history,
            tools: ToolRegistry::default(),
            event_sink: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }
}

/// Drives turns against one backend. Cheap to clone; every collaborator is
/// passed in explicitly.
#[derive(Clone)]
pub struct TurnOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    dispatcher: ToolDispatcher,
    memory: Option<Arc<dyn MemorySource>>,
    options: TurnOptions,
}

impl TurnOrchestrator {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        dispatcher: ToolDispatcher,
        options: TurnOptions,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            memory: None,
            options,
        }
    }

    /// HTTP backend, HTTP tools and (when enabled) HTTP memory, per `config`.
    pub fn from_config(config: &ChatConfig) -> Result<Self, ColloquyError> {
        config.validate()?;
        let backend = Arc::new(HttpBackend::from_config(config)?);
        let dispatcher = ToolDispatcher::new(Arc::new(HttpToolInvoker))
            .with_call_timeout(config.tool_timeout());
        let mut orchestrator = Self::new(backend, dispatcher, TurnOptions::from_config(config));
        if config.memory_enabled {
            if let Some(url) = &config.memory_url {
                orchestrator = orchestrator.with_memory(Arc::new(HttpMemorySource::new(url)));
            }
        }
        Ok(orchestrator)
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemorySource>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn options(&self) -> &TurnOptions {
        &self.options
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Start a turn in the background. The handle is returned immediately.
    pub fn start(&self, request: TurnRequest) -> TurnHandle {
        let (handle, cancel, result_tx) = TurnHandle::new(request.turn_id);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_turn(request, cancel, result_tx).await;
        });
        handle
    }

    async fn run_turn(
        self,
        request: TurnRequest,
        cancel: CancellationToken,
        result_tx: oneshot::Sender<TurnOutcome>,
    ) {
        let turn_id = request.turn_id;
        let emitter = TurnEmitter::new(turn_id, request.event_sink.clone());
        let tools = request.tools;
        let mut history = request.history;
        let mut committed: Vec<Message> = Vec::new();
        let mut continuations = 0u32;

        debug!(turn_id = %turn_id, messages = history.len(), tools = tools.len(), "turn start");

        let outcome = loop {
            emitter.state(TurnState::Requesting);
            let finalized = match self.complete_once(&history, &tools, &cancel, &emitter).await {
                Ok(finalized) => finalized,
                Err(err) if err.is_cancellation() => {
                    break TurnOutcome::cancelled(turn_id, committed, continuations);
                }
                Err(err) => {
                    emitter.error(&err);
                    break TurnOutcome::failed(turn_id, &err, committed, continuations);
                }
            };

            let message = finalized.message;
            let calls: Vec<ToolCall> = message.tool_calls().into_iter().cloned().collect();
            history.push(message.clone());
            committed.push(message.clone());
            emitter.emit(TurnEventPayload::MessageCommitted { message });

            if calls.is_empty() {
                break TurnOutcome::done(turn_id, committed, continuations);
            }

            emitter.state(TurnState::ToolPending);
            emitter.state(TurnState::ToolExecuting);
            let outputs = self.dispatcher.invoke(&calls, &tools, &cancel).await;
            // Every call gets its answer, even a cancelled one, so the
            // committed history stays well-formed.
            for output in &outputs {
                let answer = output.to_message();
                history.push(answer.clone());
                committed.push(answer);
            }
            emitter.emit(TurnEventPayload::ToolResults {
                outputs: outputs.clone(),
            });

            if cancel.is_cancelled() {
                break TurnOutcome::cancelled(turn_id, committed, continuations);
            }
            if !allows_continuation(&outputs, self.options.continuation_threshold) {
                debug!(turn_id = %turn_id, "continuation gate closed");
                break TurnOutcome::done(turn_id, committed, continuations);
            }
            if continuations >= self.options.max_continuations {
                warn!(
                    turn_id = %turn_id,
                    max = self.options.max_continuations,
                    "continuation limit reached"
                );
                break TurnOutcome::done(turn_id, committed, continuations);
            }

            continuations += 1;
            emitter.state(TurnState::Continuing);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break TurnOutcome::cancelled(turn_id, committed, continuations);
                }
                _ = tokio::time::sleep(self.options.continuation_delay) => {}
            }
        };

        emitter.state(outcome.state);
        debug!(turn_id = %turn_id, state = %outcome.state, continuations, "turn end");
        let _ = result_tx.send(outcome);
    }

    /// One request/stream cycle, ending in a finalized message for choice 0.
    ///
    /// Cancellation drops the stream (aborting the request) and yields
    /// [`ColloquyError::Canceled`] without finalizing anything.
    pub(crate) async fn complete_once(
        &self,
        history: &[Message],
        tools: &ToolRegistry,
        cancel: &CancellationToken,
        emitter: &TurnEmitter,
    ) -> Result<FinalizedMessage, ColloquyError> {
        let request = CompletionRequest {
            model: self.options.model.clone(),
            messages: assemble_messages(
                self.options.system_prompt.as_deref(),
                self.memory.as_deref(),
                history,
            )
            .await,
            tools: tools.definitions(),
            settings: self.options.settings.clone(),
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ColloquyError::Canceled),
            stream = self.backend.stream_completion(&request) => stream?,
        };
        emitter.state(TurnState::Streaming);

        let mut partial = PartialAssistantMessage::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ColloquyError::Canceled),
                next = stream.next() => next,
            };
            let Some(event) = next else {
                break;
            };
            let event = event?;
            match &event {
                StreamEvent::Done => break,
                StreamEvent::Error { error } => return Err(backend_error(error)),
                _ => {}
            }
            if partial.apply_event(&event)? {
                if let Some(choice) = event_choice(&event).and_then(|i| partial.choice(i)) {
                    emitter.emit(TurnEventPayload::PartialMessage { choice });
                }
            }
            if partial.choice(0).is_some_and(|c| c.finish_reason.is_some()) {
                break;
            }
        }
        drop(stream);

        if !partial.has_choices() {
            return Err(ColloquyError::Protocol("no response from backend".into()));
        }
        partial
            .finalize(0)
            .ok_or_else(|| ColloquyError::Protocol("no response from backend".into()))
    }
}

fn event_choice(event: &StreamEvent) -> Option<usize> {
    match event {
        StreamEvent::Role { choice, .. }
        | StreamEvent::ContentDelta { choice, .. }
        | StreamEvent::ToolCallDelta { choice, .. }
        | StreamEvent::FinishReason { choice, .. } => Some(*choice as usize),
        StreamEvent::Error { .. } | StreamEvent::Done => None,
    }
}

/// In-band backend error as a typed failure. HTTP-like codes become `Api`.
fn backend_error(error: &Value) -> ColloquyError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| (400..600).contains(code));
    match status {
        Some(status) => ColloquyError::api(status, message),
        None => ColloquyError::Protocol(format!("backend reported an error: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backend_error_with_http_code_is_api_error() {
        let err = backend_error(&json!({ "code": 429, "message": "quota" }));
        assert!(matches!(err, ColloquyError::Api { status: 429, .. }));
    }

    #[test]
    fn backend_error_without_code_is_protocol_error() {
        let err = backend_error(&json!("boom"));
        assert!(matches!(err, ColloquyError::Protocol(ref m) if m.contains("boom")));
    }

    #[test]
    fn options_default_to_documented_limits() {
        let options = TurnOptions::builder().model("m").build();
        assert_eq!(options.continuation_threshold, 8192);
        assert_eq!(options.continuation_delay, Duration::from_millis(100));
        assert_eq!(options.max_continuations, 20);
    }
}
