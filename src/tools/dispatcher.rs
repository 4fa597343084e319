//! Concurrent execution of a batch of model-requested tool calls.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ColloquyError;
use crate::types::{Message, ToolCall, ToolCallResult};
use crate::util::with_timeout;

use super::invoker::ToolInvoker;
use super::tool::ToolRegistry;
use super::validation::parse_arguments;

/// How a single call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Succeeded,
    Failed,
    Canceled,
}

/// Settled outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolExecutionOutput {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Response body on success, failure description otherwise.
    pub content: String,
    pub status: ToolCallStatus,
}

impl ToolExecutionOutput {
    fn settled(call: &ToolCall, status: ToolCallStatus, content: String) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.function_name.clone(),
            content,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolCallStatus::Succeeded
    }

    /// The `tool` message answering this call.
    pub fn to_message(&self) -> Message {
        Message::tool_result(ToolCallResult {
            tool_call_id: self.tool_call_id.clone(),
            content: self.content.clone(),
            is_error: !self.is_success(),
        })
    }
}

/// Resolves calls against a registry snapshot and runs them concurrently.
/// One call's failure never affects its siblings.
#[derive(Clone)]
pub struct ToolDispatcher {
    invoker: Arc<dyn ToolInvoker>,
    call_timeout: Option<Duration>,
}

impl ToolDispatcher {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Run every call; results keep the order of `calls`.
    pub async fn invoke(
        &self,
        calls: &[ToolCall],
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Vec<ToolExecutionOutput> {
        debug!(calls = calls.len(), "dispatching tool batch");
        join_all(calls.iter().map(|call| self.invoke_one(call, registry, cancel))).await
    }

    async fn invoke_one(
        &self,
        call: &ToolCall,
        registry: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> ToolExecutionOutput {
        let Some(tool) = registry.get(&call.function_name) else {
            let err = ColloquyError::UnresolvedTool {
                name: call.function_name.clone(),
            };
            warn!(tool = %call.function_name, call_id = %call.id, "unresolved tool call");
            return ToolExecutionOutput::settled(call, ToolCallStatus::Failed, err.to_string());
        };

        if let Err(err) = parse_arguments(&call.arguments_json, &tool.parameters) {
            warn!(tool = %tool.name, call_id = %call.id, error = %err, "rejected tool arguments");
            return ToolExecutionOutput::settled(
                call,
                ToolCallStatus::Failed,
                format!("Invalid arguments for tool '{}': {err}", tool.name),
            );
        }

        let call_future = with_timeout(
            self.call_timeout,
            self.invoker.invoke(tool, &call.arguments_json),
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ToolExecutionOutput::settled(
                call,
                ToolCallStatus::Canceled,
                ColloquyError::Canceled.to_string(),
            ),
            result = call_future => match result {
                Ok(body) => ToolExecutionOutput::settled(call, ToolCallStatus::Succeeded, body),
                Err(err) => {
                    warn!(tool = %tool.name, call_id = %call.id, error = %err, "tool call failed");
                    let err = ColloquyError::ToolExecution {
                        tool_name: tool.name.clone(),
                        message: err.to_string(),
                    };
                    ToolExecutionOutput::settled(call, ToolCallStatus::Failed, err.to_string())
                }
            },
        }
    }
}

/// Combined byte length of successful outputs.
pub fn successful_output_bytes(outputs: &[ToolExecutionOutput]) -> usize {
    outputs
        .iter()
        .filter(|o| o.is_success())
        .map(|o| o.content.len())
        .sum()
}

/// Whether a batch allows an automatic follow-up request: every call
/// succeeded and their combined output stays under `threshold` bytes.
pub fn allows_continuation(outputs: &[ToolExecutionOutput], threshold: usize) -> bool {
    outputs.iter().all(ToolExecutionOutput::is_success)
        && successful_output_bytes(outputs) < threshold
}
