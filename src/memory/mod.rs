//! Memory digest: remembered facts folded into the system prompt.

use async_trait::async_trait;

use crate::error::ColloquyError;
use crate::provider::http::{shared_client, status_to_error};

/// Supplies remembered facts for the system prompt.
#[async_trait]
pub trait MemorySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>, ColloquyError>;
}

/// `GET url` returning a JSON string array.
#[derive(Debug, Clone)]
pub struct HttpMemorySource {
    url: String,
}

impl HttpMemorySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl MemorySource for HttpMemorySource {
    async fn fetch(&self) -> Result<Vec<String>, ColloquyError> {
        let resp = shared_client().get(&self.url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(status_to_error(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Fixed memories, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticMemory(pub Vec<String>);

#[async_trait]
impl MemorySource for StaticMemory {
    async fn fetch(&self) -> Result<Vec<String>, ColloquyError> {
        Ok(self.0.clone())
    }
}

/// The `Memories:` block, one line per entry prefixed with its 1-based
/// position in `memories`. Blank entries are left out but keep their number,
/// so the prefixes always match the source array. Yields `None` when nothing
/// remains.
pub fn memory_digest(memories: &[String]) -> Option<String> {
    let lines: Vec<String> = memories
        .iter()
        .map(|m| m.trim())
        .enumerate()
        .filter(|(_, m)| !m.is_empty())
        .map(|(i, m)| format!("{}. {m}", i + 1))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("Memories:\n{}", lines.join("\n")))
}

/// Join the base prompt and memory digest into one system prompt.
pub fn build_system_prompt(base: Option<&str>, memories: &[String]) -> Option<String> {
    let segments: Vec<String> = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .into_iter()
        .chain(memory_digest(memories))
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("\n\n"))
    }
}
