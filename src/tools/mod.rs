//! Tool registry, invocation and dispatch.

pub mod discovery;
pub mod dispatcher;
pub mod invoker;
pub mod tool;
pub mod validation;

pub use discovery::discover_tools;
pub use dispatcher::{
    allows_continuation, successful_output_bytes, ToolCallStatus, ToolDispatcher,
    ToolExecutionOutput,
};
pub use invoker::{HttpToolInvoker, ToolInvoker};
pub use tool::{HttpMethod, Tool, ToolRegistry};
pub use validation::{parse_arguments, ArgumentError};
