//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that external collaborators must implement:
//! - AgentBackend: LLM invocation with tool calling and model availability
//! - SessionStore: Session metrics and workflow snapshot persistence
//! - DocumentStore: Module spec, research and plan documents
//! - CommitAutomation: Git commits after accepted task completions
//! - ContextAssembler: Prompt content for fresh-context invocations

pub mod agent_backend;
pub mod commit;
pub mod context_assembler;
pub mod session_store;

pub use agent_backend::{
    AgentBackend, BackendEvent, InvocationRequest, NativeToolActivity, ToolCallRequest,
    ToolDefinition,
};
pub use commit::{CommitAutomation, CommitOutcome};
pub use context_assembler::ContextAssembler;
pub use session_store::{DocumentStore, SessionStore};
