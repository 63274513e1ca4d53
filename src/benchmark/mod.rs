//! # Offline benchmark
//!
//! Scores the detection and fix-generation stack against a labeled corpus
//! of source snippets. A [`BenchmarkSuite`] (TOML on disk, or the built-in
//! one) feeds the [`BenchmarkRunner`], which scans each case, generates
//! fixes for what it finds, validates them, and rolls everything up into a
//! weighted report.

mod corpus;
mod runner;

pub use corpus::{BenchmarkCase, BenchmarkSuite, CorpusError, Difficulty, ScoringWeights};
pub use runner::{
    BenchmarkReport, BenchmarkRunner, BenchmarkStats, CaseResult, DifficultyStats, ScoreBreakdown,
};
