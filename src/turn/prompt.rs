//! Outbound prompt assembly.

use tracing::warn;

use crate::memory::{build_system_prompt, MemorySource};
use crate::types::Message;

/// System prompt (base prompt plus memory digest) followed by the history.
///
/// A failing memory source degrades to no memories rather than failing the
/// turn.
pub(crate) async fn assemble_messages(
    base_prompt: Option<&str>,
    memory: Option<&dyn MemorySource>,
    history: &[Message],
) -> Vec<Message> {
    let memories = match memory {
        Some(source) => source.fetch().await.unwrap_or_else(|err| {
            warn!(error = %err, "memory fetch failed; continuing without memories");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(system) = build_system_prompt(base_prompt, &memories) {
        messages.push(Message::system(system));
    }
    messages.extend(history.iter().cloned());
    messages
}
