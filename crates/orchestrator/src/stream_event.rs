//! The uniform stream event protocol.
//!
//! `StreamEvent` is the discriminated union the presentation layer consumes,
//! one JSON object per event over SSE or WebSocket. Ordering within one
//! conversation's stream is total and matches production order; events from
//! different conversations never share a stream.

use serde::{Deserialize, Serialize};
use tutorkit_core::message::Message;

/// Events emitted during a streaming orchestration run.
///
/// Wire protocol, in production order for a typical tool-using run:
/// `start`, then per iteration `iteration_start`, (`thinking` | `delta`)*,
/// tool lifecycle triples (`tool_start`, `tool_executing`, `tool_result`),
/// `iteration_end`, and finally `metrics` followed by `done` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The run began.
    Start {
        conversation_id: String,
        model: String,
    },

    /// Incremental assistant text.
    Delta { content: String },

    /// Incremental reasoning/chain-of-thought text.
    Thinking { content: String },

    /// A provider emitted a tool call.
    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The invocation was dispatched to the tool backend.
    ToolExecuting { id: String },

    /// The invocation completed (success or error).
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
        duration_ms: u64,
    },

    /// A loop iteration began.
    IterationStart { index: u32 },

    /// A loop iteration ended.
    IterationEnd { index: u32 },

    /// Aggregate statistics, emitted once when the run reaches a terminal
    /// state.
    Metrics(RunMetrics),

    /// The run completed normally with this final message.
    Done { message: Message },

    /// The run terminated abnormally.
    Error { kind: String, message: String },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Delta { .. } => "delta",
            Self::Thinking { .. } => "thinking",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::ToolResult { .. } => "tool_result",
            Self::IterationStart { .. } => "iteration_start",
            Self::IterationEnd { .. } => "iteration_end",
            Self::Metrics(_) => "metrics",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Tokens sent to the provider (backend-reported, or estimated)
    pub prompt_tokens: u32,

    /// Tokens generated by the provider (backend-reported, or estimated)
    pub completion_tokens: u32,

    /// Wall-clock duration of the run
    pub duration_ms: u64,

    /// Approximate generation throughput
    pub tokens_per_sec: f64,

    /// Think/act/observe iterations used
    pub iterations: u32,

    /// Tool calls dispatched
    pub tool_calls: u32,
}
