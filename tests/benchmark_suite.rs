//! Integration tests for the benchmark subsystem.
//!
//! Tests cover three scenarios:
//! 1. TOML corpus end to end: parse, scan, fix, validate, score
//! 2. Fix reuse: two cases in the same bug class share one generation
//! 3. Report shape: the full report serializes for downstream tooling

use std::sync::Arc;
use tokio_healing_orchestrator::benchmark::{BenchmarkRunner, BenchmarkSuite, Difficulty};
use tokio_healing_orchestrator::llm::ScriptedGenerator;

/// Helper: parse a suite, panicking with the TOML error on failure.
fn suite(raw: &str) -> BenchmarkSuite {
    BenchmarkSuite::from_toml_str(raw).unwrap_or_else(|e| panic!("corpus: {e}"))
}

// ─── TEST 1: TOML corpus end to end ──────────────────────────────────────

const MIXED_CORPUS: &str = r#"
name = "mixed-corpus"

[[cases]]
id = "easy-division"
name = "mean"
difficulty = "easy"
source = '''
fn mean(total: f64, samples: f64) -> f64 {
    total / samples
}
'''
expected_bugs = ["division_by_zero"]

[[cases]]
id = "medium-config"
name = "load_config"
difficulty = "medium"
source = '''
fn load_config(cfg: &str) -> Config {
    serde_json::from_str(cfg).unwrap()
}
'''
expected_bugs = ["malformed_payload"]

[[cases]]
id = "hard-saturating"
name = "add_clamped"
difficulty = "hard"
source = '''
fn add_clamped(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}
'''
expected_bugs = ["oversized_input"]
"#;

#[tokio::test]
async fn test_toml_corpus_end_to_end() {
    let suite = suite(MIXED_CORPUS);
    let runner = BenchmarkRunner::new(Arc::new(ScriptedGenerator::new()));

    let report = runner.run(&suite).await;

    assert_eq!(report.suite_name, "mixed-corpus");
    assert_eq!(report.stats.total_cases, 3);
    assert_eq!(report.stats.detection_successes, 2);
    assert_eq!(report.stats.fixes_generated, 2);
    assert_eq!(report.stats.fixes_valid, 2);
    assert!((report.stats.avg_improvement - 1.0).abs() < 1e-9);

    // The saturating-add overflow is invisible to lexical scanning.
    let hard = report
        .results
        .iter()
        .find(|r| r.case_id == "hard-saturating")
        .unwrap_or_else(|| panic!("hard case missing"));
    assert!(!hard.success);
    assert_eq!(hard.missed, vec!["oversized_input"]);

    // weighted = (1.0*1.0 + 1.0*1.5 + 0.0*2.0) / (1.0 + 1.5 + 2.0)
    assert!((report.scores.weighted - 2.5 / 4.5).abs() < 1e-9);
    assert!(report.scores.performance > 0.9, "scripted runs are fast");

    let hard_bucket = report.stats.by_difficulty[&Difficulty::Hard];
    assert_eq!(hard_bucket.total, 1);
    assert_eq!(hard_bucket.passed, 0);

    // 2/3 detection and a blind hard bucket both warrant advice.
    assert_eq!(report.recommendations.len(), 2);
}

// ─── TEST 2: Fix reuse across cases of the same bug class ────────────────

const PARSE_TWICE: &str = r#"
name = "parse-twice"

[[cases]]
id = "parse-a"
name = "parse_port"
difficulty = "easy"
source = '''
fn parse_port(raw: &str) -> u16 {
    raw.parse().unwrap()
}
'''
expected_bugs = ["malformed_payload"]

[[cases]]
id = "parse-b"
name = "parse_limit"
difficulty = "easy"
source = '''
fn parse_limit(raw: &str) -> usize {
    raw.parse().unwrap()
}
'''
expected_bugs = ["malformed_payload"]
"#;

#[tokio::test]
async fn test_shared_bug_class_reuses_the_fix() {
    let suite = suite(PARSE_TWICE);
    let runner = BenchmarkRunner::new(Arc::new(ScriptedGenerator::new()));

    let report = runner.run(&suite).await;

    let first = &report.results[0];
    let second = &report.results[1];
    assert!(!first.cached_fix, "first case pays for generation");
    assert!(second.cached_fix, "second case hits the cache");

    let stats = runner.cache_stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.generated, 1);
    assert_eq!(stats.reused, 1);
}

// ─── TEST 3: Report serializes for downstream tooling ────────────────────

#[tokio::test]
async fn test_report_serializes_to_json() {
    let suite = suite(PARSE_TWICE);
    let runner = BenchmarkRunner::new(Arc::new(ScriptedGenerator::new()));
    let report = runner.run(&suite).await;

    let value = serde_json::to_value(&report).unwrap_or_else(|e| panic!("serialize: {e}"));
    assert_eq!(value["suite_name"], "parse-twice");
    assert!(value["results"].as_array().is_some_and(|r| r.len() == 2));
    assert!(value["scores"]["total"].is_number());
    assert!(value["stats"]["by_difficulty"]["easy"]["passed"].is_number());
    assert!(value["timestamp"].as_u64().is_some());
}
