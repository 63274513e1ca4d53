//! # Runtime configuration
//!
//! TOML-backed settings for a whole deployment: fleet shape, model
//! endpoint, healing pipeline knobs, and benchmark scoring weights.
//! Every field has a default, so an empty file (or no file at all) yields
//! a working local setup backed by the scripted generator.
//!
//! ```toml
//! [fleet]
//! agent_count = 5
//!
//! [llm]
//! provider = "http"
//! model = "qwen2.5-coder-7b-instruct"
//! base_url = "http://localhost:1234"
//!
//! [healing]
//! call_timeout_secs = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::benchmark::ScoringWeights;
use crate::heal::HealingConfig;
use crate::llm::{build_generator, LlmError, LlmSettings, TextGenerator};

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The file was not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value was out of range.
    #[error("invalid config: {0}")]
    Validation(String),
    /// The configured generator could not be constructed.
    #[error("llm setup failed: {0}")]
    Llm(#[from] LlmError),
}

/// Fleet-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSettings {
    /// How many worker agents a default fleet spins up.
    #[serde(default = "default_agent_count")]
    pub agent_count: usize,
    /// Per-agent error history ring size.
    #[serde(default = "default_error_history_limit")]
    pub error_history_limit: usize,
}

fn default_agent_count() -> usize {
    3
}

fn default_error_history_limit() -> usize {
    100
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            agent_count: default_agent_count(),
            error_history_limit: default_error_history_limit(),
        }
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fleet shape.
    #[serde(default)]
    pub fleet: FleetSettings,
    /// Model endpoint and generation parameters.
    #[serde(default)]
    pub llm: LlmSettings,
    /// Healing pipeline knobs.
    #[serde(default)]
    pub healing: HealingConfig,
    /// Benchmark scoring weights.
    #[serde(default)]
    pub scoring: ScoringWeights,
}

impl RuntimeConfig {
    /// Parse a TOML document and validate it.
    pub fn load_from_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_from_str(&raw)
    }

    /// Range checks over every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fleet.agent_count == 0 {
            return Err(ConfigError::Validation(
                "fleet.agent_count must be at least 1".to_string(),
            ));
        }
        if self.fleet.error_history_limit == 0 {
            return Err(ConfigError::Validation(
                "fleet.error_history_limit must be at least 1".to_string(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::Validation(
                "llm.max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.healing.call_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "healing.call_timeout_secs must be at least 1".to_string(),
            ));
        }

        let weights = &self.scoring;
        for (name, value) in [
            ("scoring.detection_weight", weights.detection_weight),
            ("scoring.fix_weight", weights.fix_weight),
            ("scoring.performance_weight", weights.performance_weight),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        let weight_sum =
            weights.detection_weight + weights.fix_weight + weights.performance_weight;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(ConfigError::Validation(format!(
                "scoring weights must sum to 1.0, got {weight_sum}"
            )));
        }
        for (name, value) in [
            ("scoring.easy_multiplier", weights.easy_multiplier),
            ("scoring.medium_multiplier", weights.medium_multiplier),
            ("scoring.hard_multiplier", weights.hard_multiplier),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if weights.time_cap_secs <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "scoring.time_cap_secs must be positive, got {}",
                weights.time_cap_secs
            )));
        }
        Ok(())
    }

    /// Build the text generator this configuration names.
    pub fn generator(&self) -> Result<Arc<dyn TextGenerator>, ConfigError> {
        Ok(build_generator(&self.llm)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = RuntimeConfig::load_from_str("").unwrap_or_else(|e| panic!("load: {e}"));
        assert_eq!(config.fleet.agent_count, 3);
        assert_eq!(config.fleet.error_history_limit, 100);
        assert_eq!(config.llm.max_tokens, 512);
        assert_eq!(config.healing.call_timeout_secs, 30);
        assert!((config.scoring.detection_weight - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_full_document_round_trip() {
        let raw = r#"
            [fleet]
            agent_count = 7
            error_history_limit = 50

            [llm]
            provider = "http"
            model = "llama-3.1-8b"
            base_url = "http://10.0.0.2:8080"
            max_tokens = 1024
            temperature = 0.2

            [healing]
            call_timeout_secs = 15
            step_delay_ms = 0
            recent_window = 3

            [scoring]
            detection_weight = 0.5
            fix_weight = 0.3
            performance_weight = 0.2
        "#;
        let config = RuntimeConfig::load_from_str(raw).unwrap_or_else(|e| panic!("load: {e}"));
        assert_eq!(config.fleet.agent_count, 7);
        assert_eq!(config.llm.provider, LlmProvider::Http);
        assert_eq!(config.llm.model, "llama-3.1-8b");
        assert_eq!(config.healing.call_timeout_secs, 15);
        assert_eq!(config.healing.recent_window, 3);
        assert!((config.scoring.detection_weight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_agents_rejected() {
        let err = RuntimeConfig::load_from_str("[fleet]\nagent_count = 0\n")
            .err()
            .unwrap_or_else(|| panic!("expected validation error"));
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("agent_count")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_temperature_rejected() {
        let err = RuntimeConfig::load_from_str("[llm]\ntemperature = 3.5\n")
            .err()
            .unwrap_or_else(|| panic!("expected validation error"));
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("temperature")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let raw = "[scoring]\ndetection_weight = 0.9\nfix_weight = 0.9\nperformance_weight = 0.2\n";
        let err = RuntimeConfig::load_from_str(raw)
            .err()
            .unwrap_or_else(|| panic!("expected validation error"));
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("sum to 1.0")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_multiplier_rejected() {
        let raw = "[scoring]\nhard_multiplier = -2.0\n";
        let err = RuntimeConfig::load_from_str(raw)
            .err()
            .unwrap_or_else(|| panic!("expected validation error"));
        match err {
            ConfigError::Validation(msg) => assert!(msg.contains("hard_multiplier")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = RuntimeConfig::load_from_str("fleet = \"not a table\"")
            .err()
            .unwrap_or_else(|| panic!("expected parse error"));
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file =
            tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {e}"));
        writeln!(file, "[fleet]\nagent_count = 2").unwrap_or_else(|e| panic!("write: {e}"));
        let config = RuntimeConfig::load_from_file(file.path())
            .unwrap_or_else(|e| panic!("load: {e}"));
        assert_eq!(config.fleet.agent_count, 2);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = RuntimeConfig::load_from_file("/nonexistent/healing.toml")
            .err()
            .unwrap_or_else(|| panic!("expected io error"));
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/healing.toml"));
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scripted_provider_builds_a_generator() {
        let config = RuntimeConfig::default();
        let generator = config.generator().unwrap_or_else(|e| panic!("build: {e}"));
        assert!(generator.check_health().await);
    }
}
