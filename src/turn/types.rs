//! Turn lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ColloquyError, ErrorCategory};
use crate::types::Message;

/// Unique turn identifier.
pub type TurnId = Uuid;

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnState {
    Requesting,
    Streaming,
    ToolPending,
    ToolExecuting,
    Continuing,
    Done,
    Failed,
    Cancelled,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Final state of a turn and every message it committed, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub state: TurnState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    pub messages: Vec<Message>,
    /// Automatic follow-up requests issued after tool results.
    pub continuations: u32,
    pub finished_at: DateTime<Utc>,
}

impl TurnOutcome {
    pub fn done(turn_id: TurnId, messages: Vec<Message>, continuations: u32) -> Self {
        Self {
            turn_id,
            state: TurnState::Done,
            error: None,
            error_category: None,
            messages,
            continuations,
            finished_at: Utc::now(),
        }
    }

    pub fn cancelled(turn_id: TurnId, messages: Vec<Message>, continuations: u32) -> Self {
        Self {
            state: TurnState::Cancelled,
            ..Self::done(turn_id, messages, continuations)
        }
    }

    pub fn failed(
        turn_id: TurnId,
        error: &ColloquyError,
        messages: Vec<Message>,
        continuations: u32,
    ) -> Self {
        Self {
            state: TurnState::Failed,
            error: Some(error.to_string()),
            error_category: Some(error.category()),
            ..Self::done(turn_id, messages, continuations)
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == TurnState::Done
    }
}

/// Cloneable cancellation surface for a turn. Aborting is idempotent and a
/// no-op once the turn has finished.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    cancel: CancellationToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Handle for an in-flight turn.
#[derive(Debug)]
pub struct TurnHandle {
    turn_id: TurnId,
    cancel: CancellationToken,
    result_rx: oneshot::Receiver<TurnOutcome>,
}

impl TurnHandle {
    /// Create a handle plus the channel ends a runner implementation needs.
    pub fn new(turn_id: TurnId) -> (Self, CancellationToken, oneshot::Sender<TurnOutcome>) {
        let cancel = CancellationToken::new();
        let (result_tx, result_rx) = oneshot::channel();
        (
            Self {
                turn_id,
                cancel: cancel.clone(),
                result_rx,
            },
            cancel,
            result_tx,
        )
    }

    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            cancel: self.cancel.clone(),
        }
    }

    pub async fn wait(self) -> TurnOutcome {
        let turn_id = self.turn_id;
        self.result_rx
            .await
            .unwrap_or_else(|_| TurnOutcome::cancelled(turn_id, Vec::new(), 0))
    }
}
