//! Colloquy: conversation orchestration for AI chat clients.
//!
//! The crate turns streamed completion chunks from several backends into
//! finished assistant messages, runs the tools those messages ask for, and
//! decides whether to continue the turn with the tool results.
//!
//! - [`delta`] folds JSON patches into accumulated messages
//! - [`provider`] adapts OpenAI-style, Gemini and worker streams to one
//!   event model
//! - [`tools`] validates arguments and dispatches batches of calls
//! - [`turn`] runs the per-turn state machine
//! - [`workflow`] walks node graphs built on top of turns
//!
//! # Quick Start
//!
//! ```no_run
//! use colloquy::prelude::*;
//!
//! # async fn example() -> colloquy::error::Result<()> {
//! let config = ChatConfig::from_env()?;
//! let orchestrator = TurnOrchestrator::from_config(&config)?;
//! let mut session = ConversationSession::new(Conversation::new("demo"), orchestrator);
//! session.send(Message::user("Hello!")).await;
//! if let Some(outcome) = session.finish().await {
//!     println!("{}", outcome.state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delta;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod turn;
pub mod types;
pub mod util;
pub mod workflow;
