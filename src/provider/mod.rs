//! Provider adapters: one translator per backend family, all emitting the
//! canonical [`StreamEvent`] sequence.

pub mod backend;
pub mod framing;
pub mod google;
pub mod http;
pub mod openai;
pub mod worker;

pub use backend::{CompletionBackend, CompletionRequest, HttpBackend};

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

use crate::error::ColloquyError;
use crate::types::{StreamEvent, DONE_SENTINEL};

use framing::FrameDecoder;

/// Raw response body chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ColloquyError>>;

/// Canonical event stream produced by an adapter.
pub type EventStream = BoxStream<'static, Result<StreamEvent, ColloquyError>>;

/// Backend family. Chosen explicitly when a request is built.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-style chat completions; already canonical.
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    /// Gemini `streamGenerateContent`.
    Gemini,
    /// Worker runtime emitting one `{"response": ...}` record per line.
    Worker,
}

impl ProviderKind {
    /// A fresh adapter for one stream.
    pub fn adapter(self) -> Box<dyn ProviderAdapter> {
        match self {
            Self::OpenAi => Box::new(openai::NativeAdapter::default()),
            Self::Gemini => Box::new(google::GeminiAdapter::default()),
            Self::Worker => Box::new(worker::WorkerAdapter::default()),
        }
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Translates one frame payload at a time. Adapters are stateful per stream
/// (e.g. to synthesize a leading role event).
pub trait ProviderAdapter: Send {
    fn kind(&self) -> ProviderKind;

    /// Parse one frame payload. The end-of-stream sentinel never reaches
    /// this method.
    fn parse_frame(&mut self, payload: &str) -> Result<Vec<StreamEvent>, ColloquyError>;
}

/// Run a byte stream through an adapter.
///
/// Frames that fail to parse are logged and skipped. A transport error ends
/// the stream after being yielded. `Done` is emitted exactly once: on the
/// sentinel, or when the input runs out without one.
pub fn adapt(mut adapter: Box<dyn ProviderAdapter>, bytes: ByteStream) -> EventStream {
    let stream = async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut bytes = bytes;
        let mut finished = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            for payload in decoder.push(&chunk) {
                if payload.trim() == DONE_SENTINEL {
                    finished = true;
                    break;
                }
                for event in parse_or_skip(adapter.as_mut(), &payload) {
                    yield Ok(event);
                }
            }
            if finished {
                break;
            }
        }

        if !finished {
            for payload in decoder.finish() {
                if payload.trim() == DONE_SENTINEL {
                    break;
                }
                for event in parse_or_skip(adapter.as_mut(), &payload) {
                    yield Ok(event);
                }
            }
        }
        yield Ok(StreamEvent::Done);
    };
    Box::pin(stream)
}

fn parse_or_skip(adapter: &mut dyn ProviderAdapter, payload: &str) -> Vec<StreamEvent> {
    match adapter.parse_frame(payload) {
        Ok(events) => events,
        Err(err) => {
            warn!(provider = %adapter.kind(), error = %err, "skipping malformed frame");
            Vec::new()
        }
    }
}

/// Re-frame a canonical event stream as canonical wire bytes.
pub fn encode_wire_stream(events: EventStream) -> BoxStream<'static, Result<String, ColloquyError>> {
    events
        .map(|event| event.map(|event| event.to_wire_frame()))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn bytes_of(chunks: &[&str]) -> ByteStream {
        let owned: Vec<Result<Vec<u8>, ColloquyError>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        futures::stream::iter(owned).boxed()
    }

    #[test]
    fn provider_kind_parses_from_config_strings() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(ProviderKind::Worker.to_string(), "worker");
    }

    #[tokio::test]
    async fn done_is_synthesized_when_sentinel_missing() {
        let events: Vec<_> = adapt(
            ProviderKind::Worker.adapter(),
            bytes_of(&["{\"response\":\"a\"}\n"]),
        )
        .collect()
        .await;

        let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::role(Role::Assistant),
                StreamEvent::content("a"),
                StreamEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let events: Vec<_> = adapt(
            ProviderKind::Worker.adapter(),
            bytes_of(&["{not json\n", "{\"response\":\"ok\"}\n", "data: [DONE]\n\n"]),
        )
        .collect()
        .await;

        let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], StreamEvent::content("ok"));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let chunks: Vec<Result<Vec<u8>, ColloquyError>> = vec![
            Ok(b"{\"response\":\"a\"}\n".to_vec()),
            Err(ColloquyError::Protocol("reset".into())),
            Ok(b"{\"response\":\"b\"}\n".to_vec()),
        ];
        let events: Vec<_> = adapt(
            ProviderKind::Worker.adapter(),
            futures::stream::iter(chunks).boxed(),
        )
        .collect()
        .await;

        assert_eq!(events.len(), 3);
        assert!(events[2].is_err());
    }
}
