//! Static source heuristics for the benchmark runner.

use regex::Regex;

use super::BugKind;

/// Flags bug-prone constructs in source snippets without executing them.
///
/// These are deliberately shallow, lexical heuristics. They are tuned for
/// the benchmark corpus format, where each case is a short function with at
/// most a handful of statements, not for whole-program analysis.
#[derive(Debug)]
pub struct SourceScanner {
    division: Regex,
    large_literal: Regex,
}

impl SourceScanner {
    const PARSE_CALLS: [&'static str; 2] = ["from_str", ".parse("];
    const PARSE_HANDLING: [&'static str; 5] = ["match", "if let", "unwrap_or", "map_err", "ok()"];

    /// Build a scanner with the built-in heuristics.
    pub fn new() -> Self {
        Self {
            // Word char on each side of the slash rules out `//` comments
            // and closing tags.
            division: super::compile(r"\w\s*/\s*\w"),
            large_literal: super::compile(r"\d(?:_?\d){6,}"),
        }
    }

    /// Every bug class the snippet appears vulnerable to, in fixed order.
    pub fn scan(&self, source: &str) -> Vec<BugKind> {
        let mut found = Vec::new();
        let lower = source.to_lowercase();

        // Division without any sign of a zero check.
        if self.division.is_match(source)
            && !lower.contains("zero")
            && !lower.contains("checked_div")
        {
            found.push(BugKind::DivisionByZero);
        }

        // Parsing untrusted input with no visible failure handling.
        let parses = Self::PARSE_CALLS.iter().any(|call| source.contains(call));
        let handles = Self::PARSE_HANDLING
            .iter()
            .any(|handler| source.contains(handler));
        if parses && !handles {
            found.push(BugKind::MalformedPayload);
        }

        // Unbounded appetite: seven-plus digit literals or self-declared
        // "large" anything.
        if self.large_literal.is_match(source) || lower.contains("large") {
            found.push(BugKind::OversizedInput);
        }

        found
    }
}

impl Default for SourceScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchecked_division_is_flagged() {
        let scanner = SourceScanner::new();
        let source = "fn average(total: u64, samples: u64) -> u64 { total / samples }";
        assert_eq!(scanner.scan(source), vec![BugKind::DivisionByZero]);
    }

    #[test]
    fn test_zero_guard_suppresses_division_flag() {
        let scanner = SourceScanner::new();
        let source = "fn average(total: u64, samples: u64) -> u64 {\n    if samples == 0 { return 0; } // zero guard\n    total / samples\n}";
        assert!(scanner.scan(source).is_empty());
    }

    #[test]
    fn test_checked_div_suppresses_division_flag() {
        let scanner = SourceScanner::new();
        let source = "let avg = total.checked_div(samples);";
        assert!(scanner.scan(source).is_empty());
    }

    #[test]
    fn test_comment_slashes_do_not_count_as_division() {
        let scanner = SourceScanner::new();
        let source = "// just a comment\nlet x = 1;";
        assert!(scanner.scan(source).is_empty());
    }

    #[test]
    fn test_bare_parse_is_flagged() {
        let scanner = SourceScanner::new();
        let source = r#"let cfg: Config = serde_json::from_str(raw).unwrap();"#;
        assert_eq!(scanner.scan(source), vec![BugKind::MalformedPayload]);
    }

    #[test]
    fn test_handled_parse_is_clean() {
        let scanner = SourceScanner::new();
        let source = r#"let cfg: Config = serde_json::from_str(raw).unwrap_or_default();"#;
        assert!(scanner.scan(source).is_empty());
    }

    #[test]
    fn test_large_literal_is_flagged() {
        let scanner = SourceScanner::new();
        let source = "let buffer = vec![0u8; 10_000_000];";
        assert_eq!(scanner.scan(source), vec![BugKind::OversizedInput]);
    }

    #[test]
    fn test_large_keyword_is_flagged() {
        let scanner = SourceScanner::new();
        let source = "fn process_large_batch(items: &[Item]) { items.to_vec(); }";
        assert_eq!(scanner.scan(source), vec![BugKind::OversizedInput]);
    }

    #[test]
    fn test_multiple_findings_keep_fixed_order() {
        let scanner = SourceScanner::new();
        let source = "let rate = hits / total; let n: u32 = raw.parse().unwrap(); let cap = 50_000_000;";
        assert_eq!(
            scanner.scan(source),
            vec![
                BugKind::DivisionByZero,
                BugKind::MalformedPayload,
                BugKind::OversizedInput,
            ]
        );
    }

    #[test]
    fn test_saturating_arithmetic_is_clean() {
        let scanner = SourceScanner::new();
        let source = "fn add(a: u32, b: u32) -> u32 { a.saturating_add(b) }";
        assert!(scanner.scan(source).is_empty());
    }
}
