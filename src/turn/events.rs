//! Turn event stream types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::delta::PartialChoice;
use crate::error::{ColloquyError, ErrorCategory};
use crate::tools::ToolExecutionOutput;
use crate::types::Message;

use super::types::{TurnId, TurnState};

/// Callback receiving turn events. Invoked synchronously on the turn's task,
/// before the next stream event is read.
pub type TurnEventSink = Arc<dyn Fn(TurnEvent) + Send + Sync>;

/// Envelope for turn events.
#[derive(Debug, Clone, Serialize)]
pub struct TurnEvent {
    pub turn_id: TurnId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: TurnEventPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventPayload {
    StateChanged { state: TurnState },
    /// Live view of an in-progress choice. Never persisted.
    PartialMessage { choice: PartialChoice },
    MessageCommitted { message: Message },
    ToolResults { outputs: Vec<ToolExecutionOutput> },
    /// Failure for the user-visible error channel. Cancellation never
    /// appears here.
    Error {
        message: String,
        category: ErrorCategory,
    },
}

/// A sink that forwards into a stream, for callers that prefer polling.
pub fn event_channel() -> (TurnEventSink, BoxStream<'static, TurnEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink: TurnEventSink = Arc::new(move |event: TurnEvent| {
        let _ = tx.send(event);
    });
    (sink, UnboundedReceiverStream::new(rx).boxed())
}

pub(crate) struct TurnEmitter {
    turn_id: TurnId,
    seq: AtomicU64,
    sink: Option<TurnEventSink>,
}

impl TurnEmitter {
    pub(crate) fn new(turn_id: TurnId, sink: Option<TurnEventSink>) -> Self {
        Self {
            turn_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: TurnEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(TurnEvent {
            turn_id: self.turn_id,
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }

    pub(crate) fn state(&self, state: TurnState) {
        self.emit(TurnEventPayload::StateChanged { state });
    }

    pub(crate) fn error(&self, error: &ColloquyError) {
        if error.is_cancellation() {
            return;
        }
        self.emit(TurnEventPayload::Error {
            message: error.to_string(),
            category: error.category(),
        });
    }
}
