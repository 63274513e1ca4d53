//! # tokio-healing-orchestrator
//!
//! A fault-tolerant multi-agent task orchestrator with an LLM-backed healing
//! loop, built on Tokio.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────┐  errors map   ┌──────────────┐
//! TaskRequest ───► │   Dispatch   │ ────────────► │     Heal     │ ───► Done
//!                  │  (N agents)  │               │ (per agent)  │
//!                  └──────┬───────┘               └──────┬───────┘
//!                         │                              │
//!                   TaskHandler                 diagnose → plan → execute
//!              (pattern detectors run          (TextGenerator + fallbacks,
//!               inside the handlers)            fix/defense cache)
//! ```
//!
//! Each [`agent::Agent`] wraps a pluggable [`agent::TaskHandler`] and tracks
//! its own health: error accumulation drives a healthy → degraded → failed
//! state machine, and `heal()` resets it. Faulted agents are routed through
//! the diagnose→plan→execute pipeline in [`heal`], which degrades to static
//! fallback content whenever the language-model capability is unreachable.
//! Generated fixes and defenses are memoized in a signature-keyed
//! [`heal::FixCache`]. The [`benchmark`] module scores detection and fix
//! quality offline against a labeled corpus.

// ── Lint policy (aerospace-grade) ─────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod agent;
pub mod benchmark;
pub mod config;
pub mod detect;
pub mod graph;
pub mod heal;
pub mod llm;

// Re-exports for convenience
pub use agent::{Agent, AgentStatus, ExecutionResult, MetricsSnapshot, TaskFault, TaskHandler};
pub use detect::{AttackKind, BugKind};
pub use graph::{HealingGraph, RunReport};
pub use heal::{Diagnosis, FixCache, HealingOperation, HealingPipeline, HealingPlan};
pub use llm::{GenerateRequest, ScriptedGenerator, TextGenerator};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"` — structured JSON output for production log aggregators
/// - anything else (including unset) — human-readable pretty output
///   for local development
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Example
///
/// ```no_run
/// # use tokio_healing_orchestrator::{init_tracing, OrchestratorError};
/// # fn example() -> Result<(), OrchestratorError> {
/// init_tracing()?;
/// # Ok(()) }
/// ```
pub fn init_tracing() -> Result<(), OrchestratorError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| OrchestratorError::Other(format!("tracing init failed: {e}")))
}

/// Top-level orchestrator errors.
///
/// Subsystems carry their own error enums ([`llm::LlmError`],
/// [`heal::CacheError`], [`config::ConfigError`], ...); this type covers the
/// crate-level odds and ends.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// A configuration value is missing or invalid (e.g., missing env var).
    ///
    /// This is returned at construction time so that misconfiguration
    /// surfaces immediately rather than at the first healing call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

/// Severity grades shared by attack classification, diagnoses, and
/// preventive advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; no action required.
    Low,
    /// Worth watching; remediation can wait.
    Medium,
    /// Needs remediation soon.
    High,
    /// Needs remediation now.
    Critical,
}

impl Severity {
    /// Parse a severity from free text, case-insensitively.
    ///
    /// Model responses spell severities every which way (`"MEDIUM"`,
    /// `"High"`, `"critical "`); this accepts them all.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Stable lowercase name for logs and serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task submitted to one or more agents.
///
/// Tasks are open key-value maps: handlers read the keys they recognize
/// (`data`, `operation`, `input`, `action`, `endpoint`, `method`, `client`)
/// and ignore the rest. Unrecognized keys are never an error.
///
/// # Example
///
/// ```rust
/// use tokio_healing_orchestrator::TaskRequest;
///
/// let task = TaskRequest::new()
///     .with("data", "special_case_7")
///     .with("operation", "reverse");
/// assert_eq!(task.get_str("operation"), Some("reverse"));
/// assert_eq!(task.get_str("missing"), None);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskRequest {
    /// Raw task fields. Values are arbitrary JSON.
    pub fields: HashMap<String, Value>,
}

impl TaskRequest {
    /// Create an empty task.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a raw field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a field and view it as a string slice, if it is one.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Short, stable description of the task for error-history records.
    ///
    /// Fields are sorted so the summary does not depend on map iteration
    /// order; the whole thing is capped so a huge payload cannot bloat an
    /// agent's history.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={}", truncate_chars(s, 40)),
                other => format!("{key}={other}"),
            })
            .collect();
        parts.sort();
        truncate_chars(&parts.join(" "), 120)
    }
}

/// Seconds since the Unix epoch; 0 if the clock is before the epoch.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `"{prefix}-{8 hex chars}"` — used for agent, healer, and operation ids.
pub(crate) fn short_id(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    format!("{prefix}-{suffix}")
}

/// Truncate to at most `max` characters (not bytes — safe on any UTF-8).
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
