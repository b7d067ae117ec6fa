//! # Tutorkit Core
//!
//! Domain types, traits, and error definitions for the tutorkit conversation
//! orchestrator. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the orchestrator consumes is defined as a trait here:
//! LLM backends ([`Provider`]), the external tool service ([`tool::ToolBackend`]
//! lives in `tutorkit-tools` but its value types are here), and conversation
//! persistence ([`ConversationStore`]). Implementations live in their
//! respective crates, which keeps the dependency graph pointing inward and
//! makes every seam mockable in tests.

pub mod error;
pub mod message;
pub mod provider;
pub mod storage;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{
    ConfigError, EngineError, Error, ProviderError, RegistryError, Result, StorageError, ToolError,
};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{
    ModelInfo, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage,
};
pub use storage::{ConversationStore, InMemoryStore};
pub use tool::{next_tool_call_id, ToolCall, ToolResult};
