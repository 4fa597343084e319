//! Workflow graphs.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; edges are an
//! ordered list. Cycles (assistant ⇄ user input) are ordinary.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ColloquyError;

/// Index of a node in its workflow's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowNode {
    Start,
    /// Appends a user message. `None` takes the next caller-provided input.
    UserInput { message: Option<String> },
    /// One completion cycle. `prompt` may reference `{{variables}}`.
    Assistant {
        prompt: Option<String>,
        tool_call_next: Option<NodeId>,
    },
    /// Runs the tool calls of the latest assistant message.
    ToolCall,
    /// Runs `code` in the sandbox.
    Code { code: String },
}

impl WorkflowNode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::UserInput { .. } => "user-input",
            Self::Assistant { .. } => "assistant",
            Self::ToolCall => "tool-call",
            Self::Code { .. } => "code",
        }
    }
}

#[derive(Debug, Clone)]
pub enum EdgeCondition {
    Always,
    /// Matches the finalized assistant text.
    RegexOnContent(Regex),
    /// Matches when the assistant asked for tools.
    ToolCallRequested,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub condition: EdgeCondition,
}

#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    nodes: Vec<WorkflowNode>,
    edges: Vec<Edge>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            workflow: Self::new(name),
        }
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Append an edge; its position among the source's edges is its
    /// precedence.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, condition: EdgeCondition) {
        self.edges.push(Edge {
            source,
            target,
            condition,
        });
    }

    /// Remove every edge between `source` and `target`.
    pub fn remove_edges(&mut self, source: NodeId, target: NodeId) {
        self.edges
            .retain(|e| !(e.source == source && e.target == target));
    }

    pub fn node(&self, id: NodeId) -> Option<&WorkflowNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &WorkflowNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Outgoing edges in declaration order.
    pub fn outgoing(&self, source: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.source == source)
    }

    /// Target of the first outgoing edge.
    pub fn next(&self, source: NodeId) -> Option<NodeId> {
        self.outgoing(source).next().map(|e| e.target)
    }

    pub fn start(&self) -> Option<NodeId> {
        self.nodes()
            .find(|(_, n)| matches!(n, WorkflowNode::Start))
            .map(|(id, _)| id)
    }

    /// Exactly one start node, and every referenced node exists.
    pub fn validate(&self) -> Result<(), ColloquyError> {
        let starts = self
            .nodes
            .iter()
            .filter(|n| matches!(n, WorkflowNode::Start))
            .count();
        if starts != 1 {
            return Err(ColloquyError::Precondition(format!(
                "workflow `{}` has {starts} start nodes, expected exactly one",
                self.name
            )));
        }
        let exists = |id: NodeId| id.0 < self.nodes.len();
        if let Some(edge) = self
            .edges
            .iter()
            .find(|e| !exists(e.source) || !exists(e.target))
        {
            return Err(ColloquyError::Precondition(format!(
                "workflow `{}` has an edge {} -> {} to a missing node",
                self.name, edge.source, edge.target
            )));
        }
        for (id, node) in self.nodes() {
            if let WorkflowNode::Assistant {
                tool_call_next: Some(next),
                ..
            } = node
            {
                if !exists(*next) {
                    return Err(ColloquyError::Precondition(format!(
                        "assistant node {id} falls back to missing node {next}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Incremental construction with arena ids handed back per node.
#[derive(Debug)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn start(&mut self) -> NodeId {
        self.workflow.add_node(WorkflowNode::Start)
    }

    pub fn user_input(&mut self, message: Option<&str>) -> NodeId {
        self.workflow.add_node(WorkflowNode::UserInput {
            message: message.map(str::to_string),
        })
    }

    pub fn assistant(&mut self, prompt: Option<&str>) -> NodeId {
        self.workflow.add_node(WorkflowNode::Assistant {
            prompt: prompt.map(str::to_string),
            tool_call_next: None,
        })
    }

    pub fn tool_call(&mut self) -> NodeId {
        self.workflow.add_node(WorkflowNode::ToolCall)
    }

    pub fn code(&mut self, code: impl Into<String>) -> NodeId {
        self.workflow.add_node(WorkflowNode::Code { code: code.into() })
    }

    pub fn edge(&mut self, source: NodeId, target: NodeId) -> &mut Self {
        self.workflow.add_edge(source, target, EdgeCondition::Always);
        self
    }

    pub fn edge_if_matches(
        &mut self,
        source: NodeId,
        target: NodeId,
        pattern: &str,
    ) -> Result<&mut Self, ColloquyError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ColloquyError::Configuration(format!("bad edge pattern: {e}")))?;
        self.workflow
            .add_edge(source, target, EdgeCondition::RegexOnContent(regex));
        Ok(self)
    }

    pub fn edge_on_tool_call(&mut self, source: NodeId, target: NodeId) -> &mut Self {
        self.workflow
            .add_edge(source, target, EdgeCondition::ToolCallRequested);
        self
    }

    /// Set an assistant node's fallback for unmatched tool-call responses.
    pub fn tool_call_next(&mut self, assistant: NodeId, target: NodeId) -> &mut Self {
        if let Some(WorkflowNode::Assistant { tool_call_next, .. }) =
            self.workflow.node_mut(assistant)
        {
            *tool_call_next = Some(target);
        }
        self
    }

    pub fn build(self) -> Result<Workflow, ColloquyError> {
        self.workflow.validate()?;
        Ok(self.workflow)
    }
}
