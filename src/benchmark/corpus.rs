//! Benchmark corpus: cases, difficulty grades, and scoring weights.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Corpus loading and validation errors.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The corpus file could not be read.
    #[error("failed to read corpus {path}: {source}")]
    Io {
        /// The offending path.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The corpus file is not valid TOML of the expected shape.
    #[error("corpus parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The corpus parsed but fails a structural rule.
    #[error("invalid corpus: {0}")]
    Invalid(String),
}

/// How hard a case is expected to be, which scales its weight in the
/// difficulty-weighted score.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Surface-level patterns.
    Easy,
    /// Requires combining signals.
    Medium,
    /// Typically beyond lexical heuristics.
    Hard,
}

impl Difficulty {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labeled source snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkCase {
    /// Unique case id.
    pub id: String,
    /// Short human name, used in generation prompts.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Difficulty grade.
    pub difficulty: Difficulty,
    /// The source snippet to scan.
    pub source: String,
    /// Bug labels the scanner is expected to find.
    #[serde(default)]
    pub expected_bugs: Vec<String>,
}

/// Scoring knobs, usually deserialized from the `[scoring]` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the detection rate in the composite score.
    #[serde(default = "default_detection_weight")]
    pub detection_weight: f64,
    /// Weight of the fix-validation rate in the composite score.
    #[serde(default = "default_fix_weight")]
    pub fix_weight: f64,
    /// Weight of the timing component in the composite score.
    #[serde(default = "default_performance_weight")]
    pub performance_weight: f64,
    /// Average case time at which the timing component bottoms out.
    #[serde(default = "default_time_cap_secs")]
    pub time_cap_secs: f64,
    /// Difficulty multiplier for easy cases.
    #[serde(default = "default_easy_multiplier")]
    pub easy_multiplier: f64,
    /// Difficulty multiplier for medium cases.
    #[serde(default = "default_medium_multiplier")]
    pub medium_multiplier: f64,
    /// Difficulty multiplier for hard cases.
    #[serde(default = "default_hard_multiplier")]
    pub hard_multiplier: f64,
}

fn default_detection_weight() -> f64 {
    0.4
}

fn default_fix_weight() -> f64 {
    0.4
}

fn default_performance_weight() -> f64 {
    0.2
}

fn default_time_cap_secs() -> f64 {
    10.0
}

fn default_easy_multiplier() -> f64 {
    1.0
}

fn default_medium_multiplier() -> f64 {
    1.5
}

fn default_hard_multiplier() -> f64 {
    2.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            detection_weight: default_detection_weight(),
            fix_weight: default_fix_weight(),
            performance_weight: default_performance_weight(),
            time_cap_secs: default_time_cap_secs(),
            easy_multiplier: default_easy_multiplier(),
            medium_multiplier: default_medium_multiplier(),
            hard_multiplier: default_hard_multiplier(),
        }
    }
}

impl ScoringWeights {
    /// The multiplier for a difficulty grade.
    pub fn multiplier(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy_multiplier,
            Difficulty::Medium => self.medium_multiplier,
            Difficulty::Hard => self.hard_multiplier,
        }
    }
}

fn default_suite_name() -> String {
    "bug-detection-benchmark".to_string()
}

/// A complete benchmark corpus.
///
/// On-disk shape:
///
/// ```toml
/// name = "nightly"
///
/// [scoring]
/// detection_weight = 0.4
///
/// [[cases]]
/// id = "div-1"
/// name = "average"
/// difficulty = "easy"
/// source = "fn average(total: u64, n: u64) -> u64 { total / n }"
/// expected_bugs = ["division_by_zero"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuite {
    /// Suite name, echoed in reports.
    #[serde(default = "default_suite_name")]
    pub name: String,
    /// Scoring knobs.
    #[serde(default)]
    pub scoring: ScoringWeights,
    /// The cases, run in order.
    #[serde(default)]
    pub cases: Vec<BenchmarkCase>,
}

impl BenchmarkSuite {
    /// Parse and validate a suite from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, CorpusError> {
        let suite: Self = toml::from_str(raw)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Read, parse, and validate a suite from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Structural rules: at least one case, unique non-empty ids, non-empty
    /// sources.
    pub fn validate(&self) -> Result<(), CorpusError> {
        if self.cases.is_empty() {
            return Err(CorpusError::Invalid(
                "benchmark suite has no cases".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for case in &self.cases {
            if case.id.trim().is_empty() {
                return Err(CorpusError::Invalid("case with empty id".to_string()));
            }
            if !seen.insert(case.id.as_str()) {
                return Err(CorpusError::Invalid(format!(
                    "duplicate case id: {}",
                    case.id
                )));
            }
            if case.source.trim().is_empty() {
                return Err(CorpusError::Invalid(format!(
                    "case {} has empty source",
                    case.id
                )));
            }
        }
        Ok(())
    }

    /// The built-in six-case corpus: two cases per difficulty grade, with
    /// the hard pair deliberately beyond the lexical heuristics.
    pub fn builtin() -> Self {
        let case = |id: &str,
                    name: &str,
                    difficulty: Difficulty,
                    source: &str,
                    expected: &[&str]| BenchmarkCase {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            difficulty,
            source: source.to_string(),
            expected_bugs: expected.iter().map(|label| label.to_string()).collect(),
        };

        Self {
            name: default_suite_name(),
            scoring: ScoringWeights::default(),
            cases: vec![
                case(
                    "easy-unchecked-division",
                    "average",
                    Difficulty::Easy,
                    "fn average(total: u64, samples: u64) -> u64 {\n    total / samples\n}",
                    &["division_by_zero"],
                ),
                case(
                    "easy-bare-parse",
                    "parse_port",
                    Difficulty::Easy,
                    "fn parse_port(raw: &str) -> u16 {\n    raw.parse().unwrap()\n}",
                    &["malformed_payload"],
                ),
                case(
                    "medium-scaled-rate",
                    "error_rate",
                    Difficulty::Medium,
                    "fn error_rate(errors: u64, total: u64) -> u64 {\n    errors * 1_000_000_000 / total\n}",
                    &["division_by_zero", "oversized_input"],
                ),
                case(
                    "medium-config-loader",
                    "load_settings",
                    Difficulty::Medium,
                    "fn load_settings(raw: &str) -> Settings {\n    serde_json::from_str(raw).unwrap()\n}",
                    &["malformed_payload"],
                ),
                case(
                    "hard-modulo-shard",
                    "shard_for",
                    Difficulty::Hard,
                    "fn shard_for(key: u64, shards: u64) -> u64 {\n    key % shards\n}",
                    &["division_by_zero"],
                ),
                case(
                    "hard-unbounded-collect",
                    "collect_lines",
                    Difficulty::Hard,
                    "fn collect_lines(input: &str) -> Vec<String> {\n    input.lines().map(str::to_string).collect()\n}",
                    &["oversized_input"],
                ),
            ],
        }
    }
}
