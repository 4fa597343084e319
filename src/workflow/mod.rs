//! Directed workflow graphs over the turn machinery.
//!
//! A [`Workflow`] holds nodes (start, user input, assistant, tool call, code)
//! and ordered, conditional edges. A [`WorkflowExecutor`] walks it one node
//! per [`step`](WorkflowExecutor::step).

pub mod executor;
pub mod graph;
pub mod sandbox;

pub use executor::{StepAbortHandle, StepOutcome, WorkflowExecutor, WorkflowRun};
pub use graph::{Edge, EdgeCondition, NodeId, Workflow, WorkflowBuilder, WorkflowNode};
pub use sandbox::{CodeSandbox, VirtualFs};
