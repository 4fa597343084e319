//! Completion backends: where requests go and how their bodies come back as
//! canonical events.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::ColloquyError;
use crate::types::{GenerationSettings, Message};

use super::http::{bearer_headers, into_byte_stream, shared_client};
use super::{adapt, google, openai, worker, EventStream, ProviderKind, ToolDefinition};

/// One outbound completion request, already carrying the full prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
}

/// Source of streamed completions.
///
/// Dropping the returned stream aborts the underlying request.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn provider_kind(&self) -> ProviderKind;

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<EventStream, ColloquyError>;
}

/// HTTP backend for any [`ProviderKind`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    kind: ProviderKind,
    base_url: String,
    api_key: String,
    request_timeout: Option<Duration>,
}

impl HttpBackend {
    /// The worker runtime has no public default endpoint, so it needs an
    /// explicit `base_url`.
    pub fn new(
        kind: ProviderKind,
        base_url: Option<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ColloquyError> {
        let base_url = match (kind, base_url) {
            (_, Some(url)) => url,
            (ProviderKind::OpenAi, None) => openai::DEFAULT_BASE_URL.to_string(),
            (ProviderKind::Gemini, None) => google::DEFAULT_BASE_URL.to_string(),
            (ProviderKind::Worker, None) => {
                return Err(ColloquyError::Configuration(
                    "worker backend requires a base URL".into(),
                ))
            }
        };
        Ok(Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout: None,
        })
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, ColloquyError> {
        let mut backend = Self::new(
            config.provider,
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
        )?;
        backend.request_timeout = config.request_timeout();
        Ok(backend)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn endpoint(&self, model: &str) -> String {
        match self.kind {
            ProviderKind::OpenAi => format!("{}/chat/completions", self.base_url),
            ProviderKind::Gemini => google::stream_url(&self.base_url, model, &self.api_key),
            ProviderKind::Worker => self.base_url.clone(),
        }
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        match self.kind {
            ProviderKind::OpenAi => openai::build_request_body(request),
            ProviderKind::Gemini => google::build_request_body(request),
            ProviderKind::Worker => worker::build_request_body(request),
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
    ) -> Result<EventStream, ColloquyError> {
        let body = self.body(request);
        let url = self.endpoint(&request.model);
        // Gemini authenticates through the query string.
        let headers = match self.kind {
            ProviderKind::Gemini => bearer_headers(""),
            _ => bearer_headers(&self.api_key),
        };

        debug!(
            provider = %self.kind,
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "stream_completion"
        );

        let mut builder = shared_client().post(&url).headers(headers).json(&body);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let resp = builder.send().await?;
        let bytes = into_byte_stream(resp).await?;
        Ok(adapt(self.kind.adapter(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_without_base_url_is_rejected() {
        let err = HttpBackend::new(ProviderKind::Worker, None, "").unwrap_err();
        assert!(matches!(err, ColloquyError::Configuration(_)));
    }

    #[test]
    fn endpoints_follow_provider_kind() {
        let openai = HttpBackend::new(ProviderKind::OpenAi, None, "k").unwrap();
        assert_eq!(openai.endpoint("gpt"), "https://api.openai.com/v1/chat/completions");

        let gemini =
            HttpBackend::new(ProviderKind::Gemini, Some("http://g/".into()), "key").unwrap();
        assert_eq!(
            gemini.endpoint("flash"),
            "http://g/models/flash:streamGenerateContent?alt=sse&key=key"
        );
    }
}
