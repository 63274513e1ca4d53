//! # Pattern detection
//!
//! Regex-driven classifiers shared by the task handlers and the benchmark
//! runner:
//!
//! - [`BugRegistry`] — maps known crash-inducing input shapes to a
//!   [`BugKind`]
//! - [`AttackRegistry`] — classifies request payloads into one or more
//!   [`AttackKind`] categories
//! - [`SourceScanner`] — static heuristics that flag bug-prone source
//!   snippets without executing them
//!
//! All patterns are fixed at compile time; nothing here allocates per-call
//! beyond the match results.

mod attack;
mod bug;
mod source;

pub use attack::{AttackKind, AttackRegistry};
pub use bug::{BugKind, BugRegistry, BugSignature};
pub use source::SourceScanner;

use regex::Regex;

/// Compile a pattern known at compile time.
///
/// Only ever called with literal patterns from this module, so a failure is
/// a programming error caught by the unit tests below.
#[allow(clippy::expect_used)]
pub(crate) fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_static_patterns_compile() {
        // Constructing the registries compiles every pattern in this module.
        let bugs = BugRegistry::new();
        assert_eq!(bugs.signatures().len(), 3);
        let attacks = AttackRegistry::new();
        assert!(attacks.detect("plain text").is_empty());
        let scanner = SourceScanner::new();
        assert!(scanner.scan("fn main() {}").is_empty());
    }
}
