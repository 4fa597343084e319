//! Convenience re-exports for common use.

pub use crate::config::ChatConfig;
pub use crate::delta::{DeltaAssembler, PartialAssistantMessage};
pub use crate::error::{ColloquyError, ErrorCategory, Result};
pub use crate::memory::{HttpMemorySource, MemorySource, StaticMemory};
pub use crate::provider::{CompletionBackend, CompletionRequest, HttpBackend, ProviderKind};
pub use crate::tools::{Tool, ToolDispatcher, ToolExecutionOutput, ToolRegistry};
pub use crate::turn::{
    event_channel, ConversationSession, TurnEvent, TurnEventPayload, TurnHandle, TurnOrchestrator,
    TurnOptions, TurnOutcome, TurnRequest, TurnState,
};
pub use crate::types::{
    ContentPart, Conversation, FinishReason, GenerationSettings, Message, Role, StreamEvent,
    ToolCall,
};
pub use crate::workflow::{StepAbortHandle, StepOutcome, Workflow, WorkflowExecutor};
