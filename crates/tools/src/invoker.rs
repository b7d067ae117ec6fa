//! The tool invoker — resolves provider-emitted tool calls against the
//! backend with a hard per-call timeout.
//!
//! Invocation is infallible by construction: every failure mode (timeout,
//! unknown tool, backend error) becomes a `ToolResult` carrying an error
//! payload, which the engine appends to the conversation as an observation
//! for the model to react to.

use crate::backend::ToolBackend;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tutorkit_core::provider::ToolDefinition;
use tutorkit_core::tool::{ToolCall, ToolResult};

/// Dispatches tool calls to a backend, bounding each call's latency.
#[derive(Clone)]
pub struct ToolInvoker {
    backend: Arc<dyn ToolBackend>,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(backend: Arc<dyn ToolBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// The configured per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the backend's tool descriptors for the provider request.
    ///
    /// A backend failure downgrades to an empty tool set — the run proceeds
    /// without tools rather than failing before it starts.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        match self.backend.list_tools().await {
            Ok(defs) => defs,
            Err(e) => {
                warn!(error = %e, "Tool listing failed; continuing without tools");
                Vec::new()
            }
        }
    }

    /// Execute one tool call, always returning a result.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        debug!(tool = %call.name, call_id = %call.id, "Invoking tool");
        let start = std::time::Instant::now();

        let outcome = tokio::time::timeout(
            self.timeout,
            self.backend.execute(&call.name, call.arguments.clone()),
        )
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                let mut result = ToolResult::ok(&call.id, output.output, duration_ms);
                result.data = output.data;
                result
            }
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, format!("Error: {e}"), duration_ms)
            }
            Err(_) => {
                warn!(
                    tool = %call.name,
                    timeout_secs = self.timeout.as_secs(),
                    "Tool call timed out"
                );
                ToolResult::error(
                    &call.id,
                    format!(
                        "Error: tool '{}' timed out after {}s",
                        call.name,
                        self.timeout.as_secs()
                    ),
                    duration_ms,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ToolBackend, ToolOutput};
    use async_trait::async_trait;
    use tutorkit_core::error::ToolError;

    /// A backend that sleeps before answering — for timeout tests.
    struct SlowBackend {
        delay: Duration,
    }

    #[async_trait]
    impl ToolBackend for SlowBackend {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
            Ok(vec![])
        }

        async fn execute(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(self.delay).await;
            Ok(ToolOutput::text("finally done"))
        }
    }

    /// A backend whose listing always fails.
    struct BrokenBackend;

    #[async_trait]
    impl ToolBackend for BrokenBackend {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
            Err(ToolError::Backend("connection refused".into()))
        }

        async fn execute(
            &self,
            name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolOutput, ToolError> {
            Err(ToolError::UnknownTool(name.to_string()))
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: tutorkit_core::next_tool_call_id(),
            name: name.into(),
            arguments: serde_json::json!({"term": "mitosis"}),
        }
    }

    #[tokio::test]
    async fn successful_invocation() {
        let backend = Arc::new(crate::default_local_backend());
        let invoker = ToolInvoker::new(backend, Duration::from_secs(5));

        let result = invoker.invoke(&call("glossary_lookup")).await;
        assert!(result.success);
        assert!(result.output.contains("daughter cells"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_payload() {
        let backend = Arc::new(crate::default_local_backend());
        let invoker = ToolInvoker::new(backend, Duration::from_secs(5));

        let result = invoker.invoke(&call("no_such_tool")).await;
        assert!(!result.success);
        assert!(result.output.contains("Unknown tool"));
        // The call id is preserved so the observation links back
        assert!(result.call_id.starts_with("call_"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_error_payload() {
        let backend = Arc::new(SlowBackend {
            delay: Duration::from_secs(60),
        });
        let invoker = ToolInvoker::new(backend, Duration::from_secs(1));

        let result = invoker.invoke(&call("anything")).await;
        assert!(!result.success);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn broken_listing_downgrades_to_empty() {
        let invoker = ToolInvoker::new(Arc::new(BrokenBackend), Duration::from_secs(1));
        assert!(invoker.definitions().await.is_empty());
    }

    #[tokio::test]
    async fn definitions_come_from_backend() {
        let backend = Arc::new(crate::default_local_backend());
        let invoker = ToolInvoker::new(backend, Duration::from_secs(5));
        let defs = invoker.definitions().await;
        assert_eq!(defs.len(), 2);
    }
}
