//! One conversation with at most one turn in flight.

use tracing::debug;

use crate::tools::ToolRegistry;
use crate::types::{Conversation, Message};

use super::events::TurnEventSink;
use super::runner::{TurnOrchestrator, TurnRequest};
use super::types::{AbortHandle, TurnHandle, TurnOutcome};

/// Owns a [`Conversation`] and serializes turns against it.
pub struct ConversationSession {
    conversation: Conversation,
    orchestrator: TurnOrchestrator,
    tools: ToolRegistry,
    event_sink: Option<TurnEventSink>,
    active: Option<TurnHandle>,
}

impl ConversationSession {
    pub fn new(conversation: Conversation, orchestrator: TurnOrchestrator) -> Self {
        Self {
            conversation,
            orchestrator,
            tools: ToolRegistry::default(),
            event_sink: None,
            active: None,
        }
    }

    /// Tools for turns started from now on. A running turn keeps its snapshot.
    pub fn set_tools(&mut self, tools: ToolRegistry) {
        self.tools = tools;
    }

    pub fn set_event_sink(&mut self, sink: Option<TurnEventSink>) {
        self.event_sink = sink;
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Add `message` and start a turn over the updated history. An active
    /// turn is aborted first and whatever it completed is kept.
    pub async fn send(&mut self, message: Message) -> AbortHandle {
        if let Some(previous) = self.active.take() {
            debug!(turn_id = %previous.turn_id(), "aborting active turn");
            previous.abort();
            let outcome = previous.wait().await;
            self.commit(&outcome);
        }

        self.conversation.insert(message);
        let mut request = TurnRequest::new(self.conversation.messages().to_vec())
            .with_tools(self.tools.clone());
        if let Some(sink) = &self.event_sink {
            request = request.with_event_sink(sink.clone());
        }
        let handle = self.orchestrator.start(request);
        let abort = handle.abort_handle();
        self.active = Some(handle);
        abort
    }

    /// Abort the active turn, if any. Its outcome is still collected by
    /// [`finish`](Self::finish).
    pub fn abort(&self) {
        if let Some(active) = &self.active {
            active.abort();
        }
    }

    /// Wait for the active turn and commit its messages.
    pub async fn finish(&mut self) -> Option<TurnOutcome> {
        let handle = self.active.take()?;
        let outcome = handle.wait().await;
        self.commit(&outcome);
        Some(outcome)
    }

    fn commit(&mut self, outcome: &TurnOutcome) {
        self.conversation.extend(outcome.messages.iter().cloned());
    }
}
