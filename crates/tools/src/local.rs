//! In-process tool backend.
//!
//! Hosts a registry of [`Tool`] implementations behind the same
//! [`ToolBackend`] trait the HTTP client implements, so the invoker cannot
//! tell local from remote. Used by tests and single-binary deployments.

use crate::backend::{ToolBackend, ToolOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use tutorkit_core::error::ToolError;
use tutorkit_core::provider::ToolDefinition;

/// An in-process tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a definition for the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of in-process tools exposed as a [`ToolBackend`].
pub struct LocalToolBackend {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl LocalToolBackend {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for LocalToolBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolBackend for LocalToolBackend {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolError> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(arguments).await
    }
}

// ── Built-in tutoring tools ───────────────────────────────────────────────

/// Looks up a study term in a small built-in glossary.
pub struct GlossaryLookupTool {
    entries: HashMap<&'static str, &'static str>,
}

impl GlossaryLookupTool {
    pub fn new() -> Self {
        let entries = HashMap::from([
            (
                "photosynthesis",
                "The process by which plants convert light energy into chemical energy stored in glucose.",
            ),
            (
                "mitosis",
                "Cell division producing two genetically identical daughter cells.",
            ),
            (
                "derivative",
                "The instantaneous rate of change of a function with respect to one of its variables.",
            ),
            (
                "entropy",
                "A measure of disorder; in thermodynamics, the unavailability of a system's energy for work.",
            ),
        ]);
        Self { entries }
    }
}

impl Default for GlossaryLookupTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GlossaryLookupTool {
    fn name(&self) -> &str {
        "glossary_lookup"
    }

    fn description(&self) -> &str {
        "Look up the definition of a study term in the course glossary."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "term": {
                    "type": "string",
                    "description": "The term to look up, e.g. 'photosynthesis'"
                }
            },
            "required": ["term"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let term = arguments["term"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'term' argument".into()))?;

        match self.entries.get(term.to_lowercase().as_str()) {
            Some(definition) => Ok(ToolOutput::text(*definition)
                .with_data(serde_json::json!({ "term": term, "found": true }))),
            None => Err(ToolError::ExecutionFailed {
                tool_name: "glossary_lookup".into(),
                reason: format!("'{term}' is not in the glossary"),
            }),
        }
    }
}

/// Converts a value between metric and common units.
pub struct UnitConvertTool;

impl UnitConvertTool {
    // Factor to the base unit of each dimension (meters / grams).
    fn factor(unit: &str) -> Option<f64> {
        match unit {
            "mm" => Some(0.001),
            "cm" => Some(0.01),
            "m" => Some(1.0),
            "km" => Some(1000.0),
            "g" => Some(1.0),
            "kg" => Some(1000.0),
            _ => None,
        }
    }

    fn dimension(unit: &str) -> Option<&'static str> {
        match unit {
            "mm" | "cm" | "m" | "km" => Some("length"),
            "g" | "kg" => Some("mass"),
            _ => None,
        }
    }
}

#[async_trait]
impl Tool for UnitConvertTool {
    fn name(&self) -> &str {
        "unit_convert"
    }

    fn description(&self) -> &str {
        "Convert a numeric value between units (mm, cm, m, km, g, kg)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "value": { "type": "number" },
                "from": { "type": "string", "enum": ["mm", "cm", "m", "km", "g", "kg"] },
                "to": { "type": "string", "enum": ["mm", "cm", "m", "km", "g", "kg"] }
            },
            "required": ["value", "from", "to"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let value = arguments["value"]
            .as_f64()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'value' argument".into()))?;
        let from = arguments["from"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'from' argument".into()))?;
        let to = arguments["to"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'to' argument".into()))?;

        let (from_factor, to_factor) = match (Self::factor(from), Self::factor(to)) {
            (Some(f), Some(t)) => (f, t),
            _ => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown unit in conversion {from} -> {to}"
                )))
            }
        };

        if Self::dimension(from) != Self::dimension(to) {
            return Err(ToolError::InvalidArguments(format!(
                "Cannot convert {from} to {to}: different dimensions"
            )));
        }

        let result = value * from_factor / to_factor;
        Ok(ToolOutput::text(format!("{value} {from} = {result} {to}"))
            .with_data(serde_json::json!({ "result": result, "unit": to })))
    }
}
