//! Core types for Colloquy.

pub mod conversation;
pub mod generation;
pub mod message;
pub mod stream;

pub use conversation::*;
pub use generation::*;
pub use message::*;
pub use stream::*;
