//! Tool execution for tutorkit.
//!
//! The orchestrator consumes tools as an external request/response
//! capability: given a tool name and arguments, the backend returns a result
//! or an error, possibly after a delay. [`ToolBackend`] is that capability;
//! [`HttpToolBackend`] talks to a remote tool service and
//! [`LocalToolBackend`] hosts a small set of in-process tools for tests and
//! single-binary deployments.
//!
//! [`ToolInvoker`] sits between the iteration engine and the backend: it
//! enforces the per-call timeout and converts every failure into a
//! [`tutorkit_core::ToolResult`] error payload, so a failing tool is an
//! observation for the model, never a crashed run.

pub mod backend;
pub mod invoker;
pub mod local;

pub use backend::{HttpToolBackend, ToolBackend, ToolOutput};
pub use invoker::ToolInvoker;
pub use local::{LocalToolBackend, Tool};

/// A local backend with the built-in tutoring tools registered.
pub fn default_local_backend() -> LocalToolBackend {
    let mut backend = LocalToolBackend::new();
    backend.register(Box::new(local::GlossaryLookupTool::new()));
    backend.register(Box::new(local::UnitConvertTool));
    backend
}
