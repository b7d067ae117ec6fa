//! The external tool-execution capability.
//!
//! The backend is a collaborator, not part of the orchestrator: it advertises
//! tool descriptors and executes named tools. The HTTP implementation talks
//! to a remote tool service; the in-process implementation lives in
//! [`crate::local`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tutorkit_core::error::ToolError;
use tutorkit_core::provider::ToolDefinition;

/// A successful tool execution payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text output shown to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The tool-execution capability consumed by the orchestrator.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// The tools this backend can execute.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError>;

    /// Execute a named tool with the given arguments.
    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError>;
}

/// HTTP client for a remote tool service.
///
/// Wire contract:
/// - `GET  {base}/tools` → `[{name, description, parameters}]`
/// - `POST {base}/tools/{name}/execute` with `{"arguments": …}` →
///   `{"output": "...", "data": …}`
pub struct HttpToolBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpToolBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }
}

#[async_trait]
impl ToolBackend for HttpToolBackend {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let url = format!("{}/tools", self.base_url);
        debug!(url = %url, "Listing tools from backend");

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ToolError::Backend(format!(
                "tool listing returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("failed to parse tool listing: {e}")))
    }

    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let url = format!("{}/tools/{}/execute", self.base_url, name);
        debug!(tool = %name, "Dispatching tool execution");

        let response = self
            .request(self.client.post(&url))
            .json(&serde_json::json!({ "arguments": arguments }))
            .send()
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 404 {
            return Err(ToolError::UnknownTool(name.to_string()));
        }

        if status == 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::InvalidArguments(body));
        }

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(tool = %name, status, body = %body, "Tool execution failed");
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("backend returned {status}: {body}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: format!("failed to parse tool output: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_output_builder() {
        let out = ToolOutput::text("42").with_data(serde_json::json!({"value": 42}));
        assert_eq!(out.output, "42");
        assert_eq!(out.data.unwrap()["value"], 42);
    }

    #[test]
    fn backend_trims_trailing_slash() {
        let backend = HttpToolBackend::new("http://localhost:9090/", None);
        assert_eq!(backend.base_url, "http://localhost:9090");
    }

    #[test]
    fn tool_output_deserializes_without_data() {
        let out: ToolOutput = serde_json::from_str(r#"{"output":"done"}"#).unwrap();
        assert_eq!(out.output, "done");
        assert!(out.data.is_none());
    }
}
