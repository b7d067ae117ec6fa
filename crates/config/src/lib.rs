//! Configuration loading, validation, and management for tutorkit.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! All settings are validated at load time — a malformed or out-of-range
//! config fails fast with a descriptive error instead of failing at first
//! use deep inside a streaming run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tutorkit_core::ConfigError;

/// The root configuration structure.
///
/// Maps directly to `tutorkit.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by providers that don't set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Iteration engine settings
    #[serde(default)]
    pub engine: EngineSettings,

    /// External tool backend settings
    #[serde(default)]
    pub tool_backend: ToolBackendConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("engine", &self.engine)
            .field("tool_backend", &self.tool_backend)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Settings for the iteration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum think/act/observe iterations per run (1..=50)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-provider-call timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Per-tool-call timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Fraction of existing message history marked cacheable for providers
    /// that support server-side prompt caching (0.0 disables the hint)
    #[serde(default = "default_cache_prefix_fraction")]
    pub cache_prefix_fraction: f32,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_provider_timeout() -> u64 {
    120
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_cache_prefix_fraction() -> f32 {
    0.8
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            provider_timeout_secs: default_provider_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            cache_prefix_fraction: default_cache_prefix_fraction(),
        }
    }
}

/// Connection settings for the external tool-execution service.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ToolBackendConfig {
    /// Base URL of the tool service; `None` selects the in-process backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API key for the tool service, if it requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ToolBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBackendConfig")
            .field("url", &self.url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

/// Per-provider configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider-specific API key (falls back to the global key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Default model for this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            engine: EngineSettings::default(),
            tool_backend: ToolBackendConfig::default(),
            providers: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the given path with environment overrides.
    ///
    /// A missing file yields the defaults; a present-but-invalid file is an
    /// error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("TUTORKIT_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("TUTORKIT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("TUTORKIT_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_iterations == 0 || self.engine.max_iterations > 50 {
            return Err(ConfigError::Validation(format!(
                "engine.max_iterations must be between 1 and 50, got {}",
                self.engine.max_iterations
            )));
        }

        if self.engine.provider_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.provider_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.engine.tool_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "engine.tool_timeout_secs must be greater than 0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.engine.temperature) {
            return Err(ConfigError::Validation(
                "engine.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.engine.cache_prefix_fraction) {
            return Err(ConfigError::Validation(
                "engine.cache_prefix_fraction must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// The effective API key for a provider: its own key, else the global.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// The effective model for a provider: its default, else the global.
    pub fn model_for(&self, provider: &str) -> String {
        self.providers
            .get(provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| self.default_model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/tutorkit.toml")).unwrap();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.engine.max_iterations, 10);
    }

    #[test]
    fn parses_full_config() {
        let file = write_config(
            r#"
            default_provider = "openai"
            default_model = "gpt-4o"

            [engine]
            max_iterations = 5
            provider_timeout_secs = 60
            tool_timeout_secs = 15
            cache_prefix_fraction = 0.5

            [tool_backend]
            url = "http://localhost:9090"

            [providers.openai]
            api_key = "sk-test"

            [providers.anthropic]
            default_model = "claude-haiku-35-20241022"
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.engine.max_iterations, 5);
        assert_eq!(config.tool_backend.url.as_deref(), Some("http://localhost:9090"));
        assert_eq!(config.api_key_for("openai").as_deref(), Some("sk-test"));
        assert_eq!(config.model_for("anthropic"), "claude-haiku-35-20241022");
        assert_eq!(config.model_for("openai"), "gpt-4o");
    }

    #[test]
    fn rejects_zero_iterations() {
        let file = write_config("[engine]\nmax_iterations = 0\n");
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn rejects_iteration_bound_above_50() {
        let file = write_config("[engine]\nmax_iterations = 51\n");
        assert!(AppConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let file = write_config("[engine]\nprovider_timeout_secs = 0\n");
        assert!(AppConfig::load_from(file.path()).is_err());

        let file = write_config("[engine]\ntool_timeout_secs = 0\n");
        assert!(AppConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_cache_fraction() {
        let file = write_config("[engine]\ncache_prefix_fraction = 1.5\n");
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("cache_prefix_fraction"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let file = write_config("default_provider = [not toml");
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-very-secret".into());
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-other-secret".into()),
                ..Default::default()
            },
        );

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("sk-other-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
