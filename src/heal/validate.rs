//! Heuristic quality gate for generated code artifacts.
//!
//! Nothing here compiles or executes candidate code. Four cheap checks
//! (delimiter balance, error-handling markers, input-validation markers,
//! and coverage of the expected fault labels) approximate "did the model
//! produce something shaped like a real fix".

use serde::Serialize;

/// The four checks and their combined score.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidationReport {
    /// Non-empty and every delimiter kind balances.
    pub syntax_ok: bool,
    /// Carries at least one error-handling construct.
    pub has_error_handling: bool,
    /// Carries at least one input-validation construct.
    pub has_input_validation: bool,
    /// Fraction of expected fault labels the artifact mentions; 0 when no
    /// labels were expected.
    pub label_coverage: f64,
    /// Mean of the four checks, in `[0, 1]`.
    pub score: f64,
    /// Whether `score > 0.5`.
    pub valid: bool,
}

const ERROR_HANDLING_MARKERS: [&str; 6] = ["match ", "err(", "result<", "unwrap_or", "try", "catch"];

const INPUT_VALIDATION_MARKERS: [&str; 6] =
    ["if ", "is_empty", ".len()", "validate", "sanitize", "is_none"];

/// Score a code artifact against the fault labels it was generated for.
///
/// Marker matching is case-insensitive; label matching additionally ignores
/// punctuation, so `division_by_zero` is found in "division-by-zero" or
/// "DivisionByZero" alike.
pub fn validate_fix(code: &str, expected_labels: &[&str]) -> ValidationReport {
    let lower = code.to_lowercase();

    let syntax_ok = !code.trim().is_empty() && delimiters_balanced(code);
    let has_error_handling = ERROR_HANDLING_MARKERS
        .iter()
        .any(|marker| lower.contains(marker));
    let has_input_validation = INPUT_VALIDATION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker));

    let label_coverage = if expected_labels.is_empty() {
        0.0
    } else {
        let normalized = normalize(&lower);
        let covered = expected_labels
            .iter()
            .filter(|label| normalized.contains(&normalize(label)))
            .count();
        covered as f64 / expected_labels.len() as f64
    };

    let score = (f64::from(u8::from(syntax_ok))
        + f64::from(u8::from(has_error_handling))
        + f64::from(u8::from(has_input_validation))
        + label_coverage)
        / 4.0;

    ValidationReport {
        syntax_ok,
        has_error_handling,
        has_input_validation,
        label_coverage,
        score,
        valid: score > 0.5,
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// `()`, `[]`, and `{}` each balance and never go negative.
fn delimiters_balanced(code: &str) -> bool {
    let mut round = 0i64;
    let mut square = 0i64;
    let mut curly = 0i64;
    for c in code.chars() {
        match c {
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            '{' => curly += 1,
            '}' => curly -= 1,
            _ => {}
        }
        if round < 0 || square < 0 || curly < 0 {
            return false;
        }
    }
    round == 0 && square == 0 && curly == 0
}
