//! Benchmark execution: scan, fix, validate, score.

#![allow(missing_docs)]

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use super::corpus::{BenchmarkCase, BenchmarkSuite, Difficulty, ScoringWeights};
use crate::detect::SourceScanner;
use crate::heal::{validate_fix, CacheStats, FaultReport, FixCache, RemedyAction};
use crate::llm::TextGenerator;
use crate::unix_now;

/// Per-case outcome.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub case_id: String,
    pub name: String,
    pub difficulty: Difficulty,
    /// Bug labels the scanner found.
    pub detected: Vec<String>,
    /// Expected labels the scanner missed.
    pub missed: Vec<String>,
    /// Found labels that were not expected.
    pub unexpected: Vec<String>,
    /// Whether the scanner found anything at all.
    pub success: bool,
    pub fix_generated: bool,
    pub fix_valid: bool,
    /// Validation score of the generated fix, 0 when none was generated.
    pub improvement: f64,
    /// Whether the fix came from cache rather than fresh generation.
    pub cached_fix: bool,
    pub duration_secs: f64,
    /// Generation error, when the fix call failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DifficultyStats {
    pub total: usize,
    pub passed: usize,
    pub success_rate: f64,
    /// Mean validation score over this bucket's generated fixes.
    pub avg_improvement: f64,
    pub avg_time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkStats {
    pub total_cases: usize,
    pub detection_successes: usize,
    pub detection_rate: f64,
    pub fixes_generated: usize,
    pub fix_generation_rate: f64,
    pub fixes_valid: usize,
    pub fix_validation_rate: f64,
    /// Mean validation score over the cases that produced a fix.
    pub avg_improvement: f64,
    pub avg_case_time: f64,
    pub by_difficulty: BTreeMap<Difficulty, DifficultyStats>,
}

/// The composite score and its components, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    pub detection: f64,
    pub fix_quality: f64,
    pub performance: f64,
    /// Weighted sum of the three components.
    pub total: f64,
    /// Detection success weighted by difficulty multipliers.
    pub weighted: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub suite_name: String,
    pub results: Vec<CaseResult>,
    pub stats: BenchmarkStats,
    pub scores: ScoreBreakdown,
    pub recommendations: Vec<String>,
    pub timestamp: u64,
}

/// Runs a suite through the scanner and the code-fix cache.
///
/// Cases run sequentially so fix reuse within a run is deterministic: the
/// first case of a bug class generates, later ones hit the cache.
pub struct BenchmarkRunner {
    scanner: SourceScanner,
    cache: FixCache,
}

impl BenchmarkRunner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            scanner: SourceScanner::new(),
            cache: FixCache::for_code(generator),
        }
    }

    /// Run every case and roll up the report.
    pub async fn run(&self, suite: &BenchmarkSuite) -> BenchmarkReport {
        tracing::info!(suite = %suite.name, cases = suite.cases.len(), "benchmark run started");
        let mut results = Vec::with_capacity(suite.cases.len());
        for case in &suite.cases {
            results.push(self.run_case(case).await);
        }

        let stats = compute_stats(&results);
        let scores = compute_scores(&stats, &suite.scoring);
        let recommendations = recommend(&stats);
        tracing::info!(
            suite = %suite.name,
            total_score = scores.total,
            weighted_score = scores.weighted,
            "benchmark run finished"
        );
        BenchmarkReport {
            suite_name: suite.name.clone(),
            results,
            stats,
            scores,
            recommendations,
            timestamp: unix_now(),
        }
    }

    async fn run_case(&self, case: &BenchmarkCase) -> CaseResult {
        let start = Instant::now();
        let found = self.scanner.scan(&case.source);
        let detected: Vec<String> = found.iter().map(|kind| kind.label().to_string()).collect();
        let missed: Vec<String> = case
            .expected_bugs
            .iter()
            .filter(|expected| !detected.contains(expected))
            .cloned()
            .collect();
        let unexpected: Vec<String> = detected
            .iter()
            .filter(|label| !case.expected_bugs.contains(label))
            .cloned()
            .collect();
        let success = !detected.is_empty();

        let mut fix_generated = false;
        let mut fix_valid = false;
        let mut improvement = 0.0;
        let mut cached_fix = false;
        let mut error = None;

        if success {
            let report = FaultReport {
                error: format!(
                    "static analysis flagged {} in {}",
                    detected.join(", "),
                    case.name
                ),
                input: case.id.clone(),
                context: case.source.clone(),
            };
            match self.cache.remediate(&report).await {
                Ok(outcome) => {
                    fix_generated = true;
                    cached_fix = outcome.action == RemedyAction::AppliedExisting;
                    let labels: Vec<&str> =
                        case.expected_bugs.iter().map(String::as_str).collect();
                    let validation = validate_fix(&outcome.artifact.code, &labels);
                    fix_valid = validation.valid;
                    improvement = validation.score;
                }
                Err(e) => {
                    tracing::warn!(case = %case.id, error = %e, "fix generation failed");
                    error = Some(e.to_string());
                }
            }
        }

        let duration_secs = start.elapsed().as_secs_f64();
        tracing::info!(
            case = %case.id,
            difficulty = %case.difficulty,
            success,
            fix_generated,
            "benchmark case finished"
        );
        CaseResult {
            case_id: case.id.clone(),
            name: case.name.clone(),
            difficulty: case.difficulty,
            detected,
            missed,
            unexpected,
            success,
            fix_generated,
            fix_valid,
            improvement,
            cached_fix,
            duration_secs,
            error,
        }
    }

    /// Counters from the underlying fix cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn compute_stats(results: &[CaseResult]) -> BenchmarkStats {
    let total_cases = results.len();
    let detection_successes = results.iter().filter(|r| r.success).count();
    let fixes_generated = results.iter().filter(|r| r.fix_generated).count();
    let fixes_valid = results.iter().filter(|r| r.fix_valid).count();
    let avg_improvement = if fixes_generated == 0 {
        0.0
    } else {
        results
            .iter()
            .filter(|r| r.fix_generated)
            .map(|r| r.improvement)
            .sum::<f64>()
            / fixes_generated as f64
    };
    let avg_case_time = if total_cases == 0 {
        0.0
    } else {
        results.iter().map(|r| r.duration_secs).sum::<f64>() / total_cases as f64
    };

    let mut by_difficulty = BTreeMap::new();
    for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
        let bucket: Vec<&CaseResult> = results
            .iter()
            .filter(|r| r.difficulty == difficulty)
            .collect();
        if bucket.is_empty() {
            continue;
        }
        let total = bucket.len();
        let passed = bucket.iter().filter(|r| r.success).count();
        let fixed = bucket.iter().filter(|r| r.fix_generated).count();
        let bucket_improvement = if fixed == 0 {
            0.0
        } else {
            bucket
                .iter()
                .filter(|r| r.fix_generated)
                .map(|r| r.improvement)
                .sum::<f64>()
                / fixed as f64
        };
        by_difficulty.insert(
            difficulty,
            DifficultyStats {
                total,
                passed,
                success_rate: passed as f64 / total as f64,
                avg_improvement: bucket_improvement,
                avg_time: bucket.iter().map(|r| r.duration_secs).sum::<f64>() / total as f64,
            },
        );
    }

    let rate = |count: usize| {
        if total_cases == 0 {
            0.0
        } else {
            count as f64 / total_cases as f64
        }
    };
    BenchmarkStats {
        total_cases,
        detection_successes,
        detection_rate: rate(detection_successes),
        fixes_generated,
        fix_generation_rate: rate(fixes_generated),
        fixes_valid,
        fix_validation_rate: rate(fixes_valid),
        avg_improvement,
        avg_case_time,
        by_difficulty,
    }
}

fn compute_scores(stats: &BenchmarkStats, weights: &ScoringWeights) -> ScoreBreakdown {
    let detection = stats.detection_rate;
    let fix_quality = stats.fix_validation_rate;
    let performance = if weights.time_cap_secs <= 0.0 {
        0.0
    } else {
        1.0 - (stats.avg_case_time / weights.time_cap_secs).min(1.0)
    };
    let total = weights.detection_weight * detection
        + weights.fix_weight * fix_quality
        + weights.performance_weight * performance;

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (difficulty, bucket) in &stats.by_difficulty {
        let multiplier = weights.multiplier(*difficulty);
        weighted_sum += bucket.success_rate * multiplier * bucket.total as f64;
        weight_sum += multiplier * bucket.total as f64;
    }
    let weighted = if weight_sum == 0.0 {
        0.0
    } else {
        weighted_sum / weight_sum
    };

    ScoreBreakdown {
        detection,
        fix_quality,
        performance,
        total,
        weighted,
    }
}

fn recommend(stats: &BenchmarkStats) -> Vec<String> {
    let mut recommendations = Vec::new();
    if stats.detection_rate < 0.8 {
        recommendations.push(format!(
            "Detection rate {:.0}% is below 80%; extend the source heuristics for the missed bug classes.",
            stats.detection_rate * 100.0
        ));
    }
    if stats.fix_validation_rate < 0.5 {
        recommendations.push(
            "Less than half of the cases produced a validating fix; tighten the generation prompt or raise max_tokens.".to_string(),
        );
    }
    if let Some(hard) = stats.by_difficulty.get(&Difficulty::Hard) {
        if hard.success_rate < 0.5 {
            recommendations.push(
                "Hard cases mostly evade detection; lexical heuristics need data-flow awareness."
                    .to_string(),
            );
        }
    }
    if stats.avg_case_time > 5.0 {
        recommendations.push(format!(
            "Average case time {:.1}s is high; consider a smaller model or warmer cache.",
            stats.avg_case_time
        ));
    }
    if recommendations.is_empty() {
        recommendations
            .push("Benchmark results look healthy; ready for a larger corpus.".to_string());
    }
    recommendations
}
