//! Provider registry — maps logical provider names to adapter instances.
//!
//! Registration happens once at process start from configuration; the
//! registry is read-only thereafter, so handlers share it behind a plain
//! `Arc` with no locking.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tutorkit_core::provider::Provider;
use tutorkit_core::RegistryError;

/// Resolves provider names to adapters.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Create a new registry with a default provider name.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register an adapter. Replaces any existing adapter with the same name.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Resolve a provider by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>, RegistryError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(name.to_string()))
    }

    /// Resolve the default provider.
    pub fn default_provider(&self) -> Result<Arc<dyn Provider>, RegistryError> {
        self.resolve(&self.default_provider)
    }

    /// All registered provider names, sorted for stable ordering.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build a registry from configuration.
///
/// Every provider named in the config gets an adapter; the default provider
/// is created even when not explicitly configured.
pub fn build_from_config(config: &tutorkit_config::AppConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = config.api_key_for(name).unwrap_or_default();
        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        let provider: Arc<dyn Provider> = if name == "anthropic" {
            let mut p = AnthropicProvider::new(&api_key);
            if provider_config.api_url.is_some() {
                p = p.with_base_url(&base_url);
            }
            Arc::new(p)
        } else {
            Arc::new(OpenAiCompatProvider::new(name, &base_url, &api_key))
        };

        registry.register(name.clone(), provider);
    }

    // The default provider must resolve even with an empty [providers] table
    if registry.resolve(&config.default_provider).is_err() {
        let api_key = config.api_key.clone().unwrap_or_default();

        let provider: Arc<dyn Provider> = if config.default_provider == "anthropic" {
            Arc::new(AnthropicProvider::new(&api_key))
        } else {
            Arc::new(OpenAiCompatProvider::new(
                &config.default_provider,
                default_base_url(&config.default_provider),
                &api_key,
            ))
        };

        registry.register(config.default_provider.clone(), provider);
    }

    registry
}

/// Default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "anthropic" => "https://api.anthropic.com".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("http://localhost:8000/{provider_name}/v1"),
    }
}
