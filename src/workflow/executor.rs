//! Step-wise execution of a workflow graph.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use regex::{Captures, Regex};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ColloquyError;
use crate::memory::{memory_digest, MemorySource};
use crate::tools::{ToolExecutionOutput, ToolRegistry};
use crate::turn::events::{TurnEmitter, TurnEventPayload, TurnEventSink};
use crate::turn::TurnOrchestrator;
use crate::types::{ContentPart, Message, Role, ToolCall};

use super::graph::{EdgeCondition, NodeId, Workflow, WorkflowNode};
use super::sandbox::{CodeSandbox, VirtualFs};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder regex must compile")
});

/// Result of a single [`WorkflowExecutor::step`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Advanced { from: NodeId, to: NodeId },
    /// No outgoing edge applied; the executor stays on `node`.
    Stalled { node: NodeId },
    /// The node had nothing to act on yet; nothing changed.
    Halted { node: NodeId, reason: String },
    /// A user-input node is waiting for [`WorkflowExecutor::provide_input`].
    AwaitingInput { node: NodeId },
}

impl StepOutcome {
    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

/// Summary of [`WorkflowExecutor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub steps: usize,
    pub last: Option<StepOutcome>,
}

/// Cancels whichever step is in flight.
///
/// Every [`WorkflowExecutor::step`] runs under its own token, so aborting
/// between steps is a no-op and a cancelled step can simply be retried.
#[derive(Debug, Clone, Default)]
pub struct StepAbortHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl StepAbortHandle {
    pub fn abort(&self) {
        self.token().cancel();
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.token() = token.clone();
        token
    }

    fn token(&self) -> MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Walks a workflow, owning its history and variable bindings.
pub struct WorkflowExecutor {
    workflow: Workflow,
    orchestrator: TurnOrchestrator,
    tools: ToolRegistry,
    sandbox: Option<Arc<dyn CodeSandbox>>,
    fs: VirtualFs,
    current: NodeId,
    history: Vec<Message>,
    variables: HashMap<String, String>,
    inputs: VecDeque<String>,
    abort: StepAbortHandle,
    emitter: TurnEmitter,
}

impl WorkflowExecutor {
    pub fn new(workflow: Workflow, orchestrator: TurnOrchestrator) -> Result<Self, ColloquyError> {
        workflow.validate()?;
        let start = workflow.start().ok_or_else(|| {
            ColloquyError::Precondition(format!("workflow `{}` has no start node", workflow.name))
        })?;
        Ok(Self {
            workflow,
            orchestrator,
            tools: ToolRegistry::default(),
            sandbox: None,
            fs: VirtualFs::new(),
            current: start,
            history: Vec::new(),
            variables: HashMap::new(),
            inputs: VecDeque::new(),
            abort: StepAbortHandle::default(),
            emitter: TurnEmitter::new(Uuid::new_v4(), None),
        })
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Receive partial messages and commits from assistant nodes.
    pub fn with_event_sink(mut self, sink: TurnEventSink) -> Self {
        self.emitter = TurnEmitter::new(Uuid::new_v4(), Some(sink));
        self
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Bind the `memory` variable to the source's digest.
    pub async fn load_memory(&mut self, source: &dyn MemorySource) -> Result<(), ColloquyError> {
        let memories = source.fetch().await?;
        let digest = memory_digest(&memories).unwrap_or_default();
        self.variables.insert("memory".into(), digest);
        Ok(())
    }

    /// Queue text for user-input nodes without a literal message.
    pub fn provide_input(&mut self, text: impl Into<String>) {
        self.inputs.push_back(text.into());
    }

    /// Aborts the in-flight request or tool batch. The cancelled step returns
    /// [`ColloquyError::Canceled`] and leaves the executor on its node.
    pub fn abort_handle(&self) -> StepAbortHandle {
        self.abort.clone()
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn fs(&self) -> &VirtualFs {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut VirtualFs {
        &mut self.fs
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Step until something other than `Advanced` happens, or `max_steps`
    /// steps have run.
    pub async fn run(&mut self, max_steps: usize) -> Result<WorkflowRun, ColloquyError> {
        let mut run = WorkflowRun {
            steps: 0,
            last: None,
        };
        while run.steps < max_steps {
            let outcome = self.step().await?;
            run.steps += 1;
            let advanced = outcome.is_advanced();
            run.last = Some(outcome);
            if !advanced {
                break;
            }
        }
        Ok(run)
    }

    /// Act on the current node and move along the chosen edge.
    pub async fn step(&mut self) -> Result<StepOutcome, ColloquyError> {
        let cancel = self.abort.begin();
        let node_id = self.current;
        let node = self
            .workflow
            .node(node_id)
            .cloned()
            .ok_or_else(|| ColloquyError::InvalidState(format!("current node {node_id} is gone")))?;
        debug!(node = %node_id, kind = node.kind(), "workflow step");

        let target = match node {
            WorkflowNode::Start => self.workflow.next(node_id),
            WorkflowNode::UserInput { message } => {
                let Some(next) = self.workflow.next(node_id) else {
                    return Ok(StepOutcome::Stalled { node: node_id });
                };
                let text = match message {
                    Some(text) => text,
                    None => match self.inputs.pop_front() {
                        Some(text) => text,
                        None => return Ok(StepOutcome::AwaitingInput { node: node_id }),
                    },
                };
                self.history.push(Message::user(text));
                Some(next)
            }
            WorkflowNode::Assistant {
                prompt,
                tool_call_next,
            } => {
                if self.history.is_empty() {
                    return Ok(halted(node_id, "no history to respond to"));
                }
                self.run_assistant(node_id, prompt.as_deref(), tool_call_next, &cancel)
                    .await?
            }
            WorkflowNode::ToolCall => {
                let Some(calls) = self.pending_tool_calls() else {
                    return Ok(halted(node_id, "no assistant tool calls to run"));
                };
                let outputs = self
                    .orchestrator
                    .dispatcher()
                    .invoke(&calls, &self.tools, &cancel)
                    .await;
                self.history
                    .extend(outputs.iter().map(ToolExecutionOutput::to_message));
                self.emitter.emit(TurnEventPayload::ToolResults { outputs });
                self.workflow.next(node_id)
            }
            WorkflowNode::Code { code } => {
                self.run_code(&code).await?;
                self.workflow.next(node_id)
            }
        };

        Ok(match target {
            Some(to) => {
                self.current = to;
                StepOutcome::Advanced { from: node_id, to }
            }
            None => StepOutcome::Stalled { node: node_id },
        })
    }

    /// One completion cycle, then edges in declaration order, then the
    /// tool-call fallback.
    async fn run_assistant(
        &mut self,
        node_id: NodeId,
        prompt: Option<&str>,
        tool_call_next: Option<NodeId>,
        cancel: &CancellationToken,
    ) -> Result<Option<NodeId>, ColloquyError> {
        let mut request_history = Vec::with_capacity(self.history.len() + 1);
        if let Some(prompt) = prompt {
            request_history.push(Message::system(self.substitute(prompt)));
        }
        request_history.extend(self.history.iter().cloned());

        let finalized = self
            .orchestrator
            .complete_once(&request_history, &self.tools, cancel, &self.emitter)
            .await?;
        let text = finalized.message.text();
        let requests_tools = finalized.requests_tools();
        let has_calls = !finalized.message.tool_calls().is_empty();
        self.history.push(finalized.message.clone());
        self.emitter.emit(TurnEventPayload::MessageCommitted {
            message: finalized.message,
        });

        let matched = self
            .workflow
            .outgoing(node_id)
            .find(|edge| match &edge.condition {
                EdgeCondition::Always => true,
                EdgeCondition::RegexOnContent(regex) => regex.is_match(&text),
                EdgeCondition::ToolCallRequested => requests_tools,
            })
            .map(|edge| edge.target);

        Ok(matched.or(if has_calls { tool_call_next } else { None }))
    }

    async fn run_code(&mut self, code: &str) -> Result<(), ColloquyError> {
        let sandbox = self.sandbox.clone().ok_or_else(|| {
            ColloquyError::Configuration("code node reached without a sandbox".into())
        })?;
        sandbox.sync_in(&self.fs).await?;
        let output = sandbox.execute(code).await?;
        self.fs = sandbox.sync_out().await?;
        if output.is_error {
            warn!(node = %self.current, "code node reported an error");
        }
        let message = Message::assistant_parts(vec![ContentPart::ExecutionOutput(output)]);
        self.history.push(message.clone());
        self.emitter
            .emit(TurnEventPayload::MessageCommitted { message });
        Ok(())
    }

    /// Tool calls of the latest assistant message, if it has any.
    fn pending_tool_calls(&self) -> Option<Vec<ToolCall>> {
        let last = self
            .history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)?;
        let calls: Vec<ToolCall> = last.tool_calls().into_iter().cloned().collect();
        (!calls.is_empty()).then_some(calls)
    }

    /// Replace `{{name}}` with bound variables. Unknown names stay verbatim.
    fn substitute(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                self.variables
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn halted(node: NodeId, reason: &str) -> StepOutcome {
    StepOutcome::Halted {
        node,
        reason: reason.to_string(),
    }
}
