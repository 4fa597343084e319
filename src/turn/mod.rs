//! Turn orchestration.
//!
//! A turn runs `Requesting → Streaming → (ToolPending → ToolExecuting →
//! Continuing)* → Done | Failed | Cancelled` on its own task. Callers get a
//! [`TurnHandle`] back immediately and observe progress through a
//! [`TurnEventSink`].

pub mod events;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod types;

pub use events::{event_channel, TurnEvent, TurnEventPayload, TurnEventSink};
pub use runner::{TurnOptions, TurnOrchestrator, TurnRequest};
pub use session::ConversationSession;
pub use types::{AbortHandle, TurnHandle, TurnId, TurnOutcome, TurnState};
