//! Chat configuration (layered: code > env / TOML file > defaults).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ColloquyError;
use crate::provider::ProviderKind;
use crate::types::GenerationSettings;

pub const DEFAULT_CONTINUATION_THRESHOLD: usize = 8192;
pub const DEFAULT_CONTINUATION_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_CONTINUATIONS: u32 = 20;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 60_000;

/// Everything a conversation needs to reach its backend and collaborators.
#[derive(Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    #[builder(default = ProviderKind::OpenAi)]
    pub provider: ProviderKind,
    #[builder(into)]
    pub model: String,
    #[builder(into)]
    pub base_url: Option<String>,
    #[builder(into)]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base system prompt placed before the memory digest.
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub memory_enabled: bool,
    #[builder(into)]
    pub memory_url: Option<String>,
    #[builder(into)]
    pub tool_registry_url: Option<String>,
    /// Successful tool output (bytes) at which automatic continuation stops.
    #[builder(default = DEFAULT_CONTINUATION_THRESHOLD)]
    pub continuation_threshold: usize,
    #[builder(default = DEFAULT_CONTINUATION_DELAY_MS)]
    pub continuation_delay_ms: u64,
    #[builder(default = DEFAULT_MAX_CONTINUATIONS)]
    pub max_continuations: u32,
    #[builder(default = DEFAULT_TOOL_TIMEOUT_MS)]
    pub tool_timeout_ms: u64,
    pub request_timeout_ms: Option<u64>,
    #[builder(default)]
    pub settings: GenerationSettings,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("system_prompt", &self.system_prompt)
            .field("memory_enabled", &self.memory_enabled)
            .field("memory_url", &self.memory_url)
            .field("tool_registry_url", &self.tool_registry_url)
            .field("continuation_threshold", &self.continuation_threshold)
            .field("continuation_delay_ms", &self.continuation_delay_ms)
            .field("max_continuations", &self.max_continuations)
            .field("tool_timeout_ms", &self.tool_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: String::new(),
            base_url: None,
            api_key: None,
            system_prompt: None,
            memory_enabled: false,
            memory_url: None,
            tool_registry_url: None,
            continuation_threshold: DEFAULT_CONTINUATION_THRESHOLD,
            continuation_delay_ms: DEFAULT_CONTINUATION_DELAY_MS,
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            request_timeout_ms: None,
            settings: GenerationSettings::default(),
        }
    }
}

impl ChatConfig {
    /// Load from the process environment (after reading `.env` if present).
    pub fn from_env() -> Result<Self, ColloquyError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ColloquyError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match var("COLLOQUY_PROVIDER") {
            Some(raw) => raw.trim().to_lowercase().parse::<ProviderKind>().map_err(|_| {
                ColloquyError::Configuration(format!("unknown provider `{raw}`"))
            })?,
            None => ProviderKind::OpenAi,
        };

        let fallback_key = match provider {
            ProviderKind::OpenAi => var("OPENAI_API_KEY"),
            ProviderKind::Gemini => var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")),
            ProviderKind::Worker => None,
        };
        let memory_url = var("COLLOQUY_MEMORY_URL");

        let config = Self {
            provider,
            model: var("COLLOQUY_MODEL").unwrap_or_default(),
            base_url: var("COLLOQUY_BASE_URL"),
            api_key: var("COLLOQUY_API_KEY").or(fallback_key),
            system_prompt: var("COLLOQUY_SYSTEM_PROMPT"),
            memory_enabled: memory_url.is_some(),
            memory_url,
            tool_registry_url: var("COLLOQUY_TOOL_REGISTRY_URL"),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ColloquyError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ColloquyError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ColloquyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject combinations no backend can serve.
    pub fn validate(&self) -> Result<(), ColloquyError> {
        if self.model.trim().is_empty() {
            return Err(ColloquyError::Configuration("model is required".into()));
        }
        if self.provider == ProviderKind::Worker && self.base_url.is_none() {
            return Err(ColloquyError::Configuration(
                "worker provider requires base_url".into(),
            ));
        }
        if self.memory_enabled && self.memory_url.is_none() {
            return Err(ColloquyError::Configuration(
                "memory_enabled requires memory_url".into(),
            ));
        }
        Ok(())
    }

    pub fn continuation_delay(&self) -> Duration {
        Duration::from_millis(self.continuation_delay_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn builder_applies_defaults() {
        let config = ChatConfig::builder().model("gpt-4o").build();

        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.continuation_threshold, 8192);
        assert_eq!(config.continuation_delay(), Duration::from_millis(100));
        assert_eq!(config.max_continuations, 20);
        assert_eq!(config.tool_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn env_falls_back_to_provider_key() {
        let config = ChatConfig::from_lookup(lookup(&[
            ("COLLOQUY_PROVIDER", "gemini"),
            ("COLLOQUY_MODEL", "gemini-2.0-flash"),
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_API_KEY", "o-key"),
        ]))
        .unwrap();

        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert!(!config.memory_enabled);
    }

    #[test]
    fn explicit_key_wins_and_memory_url_enables_memory() {
        let config = ChatConfig::from_lookup(lookup(&[
            ("COLLOQUY_MODEL", "gpt-4o"),
            ("COLLOQUY_API_KEY", "explicit"),
            ("OPENAI_API_KEY", "fallback"),
            ("COLLOQUY_MEMORY_URL", "http://memory"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("explicit"));
        assert!(config.memory_enabled);
    }

    #[test]
    fn unknown_provider_is_a_configuration_error() {
        let err = ChatConfig::from_lookup(lookup(&[
            ("COLLOQUY_PROVIDER", "carrier-pigeon"),
            ("COLLOQUY_MODEL", "m"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ColloquyError::Configuration(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ChatConfig::builder()
            .model("m")
            .api_key("sk-secret")
            .build();
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
