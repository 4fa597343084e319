//! Loading tools from a remote registry.
//!
//! The registry answers `GET` with `{"tools":[{"id","definitionUrl"}]}`. Each
//! definition is an OpenAPI document describing a single operation.

use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ChatConfig;
use crate::error::ColloquyError;
use crate::provider::http::{shared_client, status_to_error};

use super::tool::{HttpMethod, Tool, ToolRegistry};

const METHODS: [(&str, HttpMethod); 5] = [
    ("get", HttpMethod::Get),
    ("post", HttpMethod::Post),
    ("put", HttpMethod::Put),
    ("patch", HttpMethod::Patch),
    ("delete", HttpMethod::Delete),
];

#[derive(Debug, Deserialize)]
struct RegistryListing {
    #[serde(default)]
    tools: Vec<RegistryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryEntry {
    id: String,
    definition_url: String,
}

/// Fetch the registry listing and every tool definition it points at.
///
/// A definition that cannot be fetched or understood is logged and skipped.
/// Only a failure of the listing itself fails discovery.
pub async fn discover_tools(registry_url: &str) -> Result<ToolRegistry, ColloquyError> {
    let listing: RegistryListing = fetch_json(registry_url).await?;
    debug!(registry = registry_url, entries = listing.tools.len(), "fetched tool registry");

    let loaded = join_all(listing.tools.iter().map(|entry| async move {
        let doc: Value = fetch_json(&entry.definition_url).await?;
        tool_from_openapi(&doc, &entry.definition_url)
    }))
    .await;

    let mut tools = Vec::with_capacity(loaded.len());
    for (entry, result) in listing.tools.iter().zip(loaded) {
        match result {
            Ok(tool) => tools.push(tool),
            Err(err) => warn!(tool_id = %entry.id, error = %err, "skipping tool definition"),
        }
    }
    Ok(ToolRegistry::new(tools))
}

impl ToolRegistry {
    /// Discover tools from `config.tool_registry_url`. Without a registry URL
    /// the result is an empty registry.
    pub async fn discover(config: &ChatConfig) -> Result<Self, ColloquyError> {
        match &config.tool_registry_url {
            Some(url) => discover_tools(url).await,
            None => Ok(Self::default()),
        }
    }
}

async fn fetch_json<T: serde::de::DeserializeOwned>(url: &str) -> Result<T, ColloquyError> {
    let resp = shared_client().get(url).send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(status_to_error(status.as_u16(), &body));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Build a [`Tool`] from an OpenAPI document.
///
/// Name and description come from `info`; the first documented operation
/// supplies the method, endpoint and JSON request-body schema. Relative
/// endpoints resolve against `servers[0].url`, else against the document URL.
pub fn tool_from_openapi(doc: &Value, definition_url: &str) -> Result<Tool, ColloquyError> {
    let info = doc
        .get("info")
        .ok_or_else(|| ColloquyError::Protocol("tool definition has no `info`".into()))?;
    let title = info
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ColloquyError::Protocol("tool definition has no `info.title`".into()))?;
    let description = info
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let (path, item) = doc
        .get("paths")
        .and_then(Value::as_object)
        .and_then(|paths| paths.iter().next())
        .ok_or_else(|| ColloquyError::Protocol(format!("tool `{title}` documents no paths")))?;
    let (method, operation) = METHODS
        .iter()
        .find_map(|(key, method)| item.get(*key).map(|op| (*method, op)))
        .ok_or_else(|| {
            ColloquyError::Protocol(format!("tool `{title}` documents no operation on {path}"))
        })?;

    let parameters = operation
        .pointer("/requestBody/content/application~1json/schema")
        .cloned()
        .unwrap_or_else(|| json!({ "type": "object", "properties": {} }));

    Ok(Tool {
        name: sanitize_name(title),
        description: description.to_string(),
        endpoint: resolve_endpoint(doc, path, definition_url)?,
        method,
        parameters,
    })
}

fn resolve_endpoint(doc: &Value, path: &str, definition_url: &str) -> Result<String, ColloquyError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }
    let server = doc
        .pointer("/servers/0/url")
        .and_then(Value::as_str)
        .map(|url| url.trim_end_matches('/').to_string());
    if let Some(server) = server {
        return Ok(format!("{server}{path}"));
    }
    let base = reqwest::Url::parse(definition_url)
        .map_err(|e| ColloquyError::Protocol(format!("bad definition URL: {e}")))?;
    base.join(path)
        .map(String::from)
        .map_err(|e| ColloquyError::Protocol(format!("bad tool path {path}: {e}")))
}

/// Function names may only contain letters, digits, `_` and `-`.
fn sanitize_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name.trim_matches('_').to_string()
}
