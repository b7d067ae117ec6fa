//! Tool call and result value types.
//!
//! The orchestrator does not execute tools itself — a provider emits tool
//! calls, the invoker in `tutorkit-tools` resolves them against the external
//! tool backend, and the results come back here as data to be appended to
//! the conversation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A request to execute a tool, with arguments parsed into structured form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID, assigned by [`next_tool_call_id`]
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
///
/// Carries either a success payload or an error description — a failing tool
/// is data for the model to react to, never a fatal condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result answers
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content, or the error description on failure
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Execution latency in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
            data: None,
            duration_ms,
        }
    }

    /// An error result. The description lands in `output` so the model sees
    /// it as an observation.
    pub fn error(call_id: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: error.into(),
            data: None,
            duration_ms,
        }
    }
}

// Providers are not guaranteed to produce globally unique tool-call ids, so
// the engine reassigns each call an id of its own before dispatch.
static CALL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generate a process-wide unique tool-call id from the current unix-millis
/// timestamp plus a monotonic sequence counter.
pub fn next_tool_call_id() -> String {
    let seq = CALL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("call_{}_{seq}", Utc::now().timestamp_millis())
}
