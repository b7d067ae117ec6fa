//! Error types for the tutorkit domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! (provider, tool, engine, registry, storage, config) has its own enum, and
//! every variant that can reach the wire exposes a stable machine-readable
//! `kind()` string alongside the human-readable `Display` message.

use thiserror::Error;

/// The top-level error type for all tutorkit operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable kind, suitable for the terminal `error`
    /// stream event.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Provider(e) => e.kind(),
            Error::Tool(e) => e.kind(),
            Error::Engine(e) => e.kind(),
            Error::Registry(e) => e.kind(),
            Error::Storage(_) => "storage_failed",
            Error::Config(_) => "invalid_config",
            Error::Serialization(_) => "serialization_failed",
            Error::Internal(_) => "internal",
        }
    }
}

// --- Bounded context errors ---

/// Failures surfaced by a provider adapter.
///
/// Adapters must map every remote failure into one of these variants rather
/// than returning a partial silent result. Text already streamed before the
/// failure stays valid and is never retracted.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider unreachable: {0}")]
    Unavailable(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request (status {status_code}): {message}")]
    InvalidRequest { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl ProviderError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "provider_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout { .. } => "provider_timeout",
        }
    }
}

/// Failures surfaced by the tool layer.
///
/// None of these are fatal to a run — the invoker converts them into an
/// error-carrying `ToolResult` so the model can react to the failure.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool backend unreachable: {0}")]
    Backend(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::ExecutionFailed { .. } => "tool_execution_failed",
            Self::Timeout { .. } => "tool_timeout",
            Self::Backend(_) => "tool_backend_unavailable",
            Self::InvalidArguments(_) => "invalid_tool_arguments",
        }
    }
}

/// Terminal outcomes of the iteration engine that are not provider errors.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Maximum iterations exceeded ({max_iterations})")]
    MaxIterationsExceeded { max_iterations: u32 },

    #[error("Run cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MaxIterationsExceeded { .. } => "max_iterations_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Routing and active-stream registry failures.
///
/// These are fatal to the request and surfaced before any stream begins.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Conversation {0} already has an active stream")]
    ConversationAlreadyStreaming(String),

    #[error("Conversation {0} is not streaming")]
    NotStreaming(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl RegistryError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConversationAlreadyStreaming(_) => "conversation_already_streaming",
            Self::NotStreaming(_) => "not_streaming",
            Self::UnknownProvider(_) => "unknown_provider",
        }
    }
}

/// Conversation persistence failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Configuration loading and validation failures.
///
/// Produced at startup — the process fails fast with a descriptive message
/// instead of failing at first use.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config at {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}
