//! HTTP-backed tools and the per-turn registry snapshot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::provider::ToolDefinition;

/// HTTP verb a tool endpoint is called with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A registered tool. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// JSON Schema for the call arguments.
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        method: HttpMethod,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            endpoint: endpoint.into(),
            method,
            parameters,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Function-call schema advertised to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Immutable set of tools. Cloning is cheap and yields the same snapshot, so
/// a turn keeps seeing the registry it started with.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<Vec<Tool>>,
}

impl ToolRegistry {
    /// Later entries with a duplicate name are dropped.
    pub fn new(tools: impl IntoIterator<Item = Tool>) -> Self {
        let mut unique: Vec<Tool> = Vec::new();
        for tool in tools {
            if unique.iter().any(|t| t.name == tool.name) {
                tracing::warn!(tool = %tool.name, "duplicate tool name ignored");
                continue;
            }
            unique.push(tool);
        }
        Self {
            tools: Arc::new(unique),
        }
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(Tool::definition).collect()
    }

    /// New registry with `tool` added or replaced. Existing snapshots are
    /// unaffected.
    pub fn with_tool(&self, tool: Tool) -> Self {
        let mut tools: Vec<Tool> = self
            .tools
            .iter()
            .filter(|t| t.name != tool.name)
            .cloned()
            .collect();
        tools.push(tool);
        Self {
            tools: Arc::new(tools),
        }
    }
}
