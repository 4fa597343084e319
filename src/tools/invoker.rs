//! Tool execution transport.

use async_trait::async_trait;
use tracing::debug;

use crate::error::ColloquyError;
use crate::provider::http::{shared_client, status_to_error};

use super::tool::Tool;

/// Performs one tool call and returns its raw text output.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &Tool, arguments_json: &str) -> Result<String, ColloquyError>;
}

/// Calls `METHOD endpoint` with the raw arguments as the body and returns
/// the response text verbatim.
#[derive(Debug, Clone, Default)]
pub struct HttpToolInvoker;

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, tool: &Tool, arguments_json: &str) -> Result<String, ColloquyError> {
        debug!(tool = %tool.name, method = %tool.method, endpoint = %tool.endpoint, "invoking tool");

        let resp = shared_client()
            .request(tool.method.as_reqwest(), &tool.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(arguments_json.to_string())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(status_to_error(status.as_u16(), &body));
        }
        Ok(body)
    }
}
