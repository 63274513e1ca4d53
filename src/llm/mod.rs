//! # Text generation backends
//!
//! The healing pipeline and fix cache speak to language models through one
//! narrow trait, [`TextGenerator`]. Two implementations ship with the crate:
//!
//! - [`HttpGenerator`] — OpenAI-compatible `/v1/chat/completions` client,
//!   pointed at a local or hosted endpoint
//! - [`ScriptedGenerator`] — deterministic canned responses for tests and
//!   offline benchmark runs
//!
//! Callers never branch on the backend; degraded operation (fallback
//! diagnoses and plans) is handled one layer up, in [`crate::heal`].

mod http;
mod scripted;

pub use http::HttpGenerator;
pub use scripted::{FailingGenerator, ScriptedGenerator};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from text-generation backends.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The configured API-key environment variable is not set.
    #[error("API key environment variable {var} is not set")]
    MissingApiKey {
        /// Name of the environment variable that was consulted.
        var: String,
    },

    /// Network-level failure reaching the endpoint.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status or an unusable body.
    #[error("generation request failed: {0}")]
    Request(String),

    /// The call did not complete within the configured deadline.
    #[error("generation timed out after {secs}s")]
    Timeout {
        /// The deadline that was exceeded.
        secs: u64,
    },

    /// The endpoint answered successfully but produced no usable text.
    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The user-role prompt.
    pub prompt: String,
    /// Optional system-role framing.
    pub system: Option<String>,
    /// Completion length cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerateRequest {
    /// New request with the crate defaults (512 tokens, temperature 0.7).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    /// Set the system-role framing.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the completion length cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Backend-agnostic text generation.
///
/// Implementations must be cheap to share (`Arc<dyn TextGenerator>`) and
/// safe to call concurrently.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the request.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError>;

    /// Quick liveness probe; `false` means callers should expect fallbacks.
    async fn check_health(&self) -> bool;
}

/// Which backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Canned deterministic responses.
    Scripted,
    /// OpenAI-compatible chat-completions endpoint.
    Http,
}

/// Backend configuration, usually deserialized from the `[llm]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Which backend to use.
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Model identifier passed through to the endpoint.
    #[serde(default = "default_model")]
    pub model: String,
    /// Endpoint base URL (no trailing `/v1`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Default completion length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> LlmProvider {
    LlmProvider::Scripted
}

fn default_model() -> String {
    "qwen2.5-coder-7b-instruct".to_string()
}

fn default_base_url() -> String {
    "http://localhost:1234".to_string()
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Construct the generator described by `settings`.
///
/// # Errors
///
/// [`LlmError::MissingApiKey`] if the HTTP provider is selected and the
/// configured environment variable is unset.
pub fn build_generator(settings: &LlmSettings) -> Result<Arc<dyn TextGenerator>, LlmError> {
    match settings.provider {
        LlmProvider::Scripted => Ok(Arc::new(ScriptedGenerator::new())),
        LlmProvider::Http => {
            let generator = HttpGenerator::from_settings(settings)?;
            Ok(Arc::new(generator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_overrides_defaults() {
        let request = GenerateRequest::new("hello")
            .with_system("frame")
            .with_max_tokens(64)
            .with_temperature(0.2);
        assert_eq!(request.prompt, "hello");
        assert_eq!(request.system.as_deref(), Some("frame"));
        assert_eq!(request.max_tokens, 64);
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = LlmSettings::default();
        assert_eq!(settings.provider, LlmProvider::Scripted);
        assert_eq!(settings.api_key_env, "LLM_API_KEY");
        assert_eq!(settings.max_tokens, 512);
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn test_settings_deserialize_partial_table() {
        let settings: LlmSettings = toml::from_str(
            r#"
            provider = "http"
            base_url = "http://localhost:8080"
            "#,
        )
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(settings.provider, LlmProvider::Http);
        assert_eq!(settings.base_url, "http://localhost:8080");
        // Unspecified fields fall back to defaults.
        assert_eq!(settings.model, "qwen2.5-coder-7b-instruct");
    }

    #[test]
    fn test_build_generator_scripted_needs_no_key() {
        let settings = LlmSettings::default();
        assert!(build_generator(&settings).is_ok());
    }

    #[test]
    fn test_timeout_error_names_the_deadline() {
        let err = LlmError::Timeout { secs: 30 };
        assert!(err.to_string().contains("30s"));
    }
}
