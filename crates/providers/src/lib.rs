//! LLM provider adapters for tutorkit.
//!
//! All adapters implement the `tutorkit_core::Provider` trait. The registry
//! maps logical provider names to adapter instances and is built once from
//! configuration at startup.

pub mod anthropic;
pub mod openai_compat;
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{build_from_config, ProviderRegistry};
