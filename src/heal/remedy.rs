//! Remedy strategies: how faults become signatures and generation prompts.

use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::detect::{AttackRegistry, BugKind, BugRegistry};
use crate::llm::GenerateRequest;
use crate::{truncate_chars, Severity};

/// A fault handed to the fix cache: what failed, on what, and the code (or
/// surface) it failed in.
#[derive(Debug, Clone)]
pub struct FaultReport {
    /// The fault's display text.
    pub error: String,
    /// The input that triggered it.
    pub input: String,
    /// The implicated source code or surface description.
    pub context: String,
}

/// Canonical identity of a fault class.
///
/// Two faults with the same signature share one cached remedy. The key is
/// derived from the sorted class tokens, so it is stable across input
/// variations within a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultSignature {
    /// 16-hex-digit cache key.
    pub key: String,
    /// Human-readable form: the sorted tokens joined with `_`.
    pub label: String,
    /// The class tokens, sorted and deduplicated.
    pub tokens: Vec<String>,
}

impl FaultSignature {
    /// Signature from class tokens. Tokens are sorted and deduplicated so
    /// derivation order never changes the key.
    pub fn from_tokens(mut tokens: Vec<String>) -> Self {
        tokens.sort();
        tokens.dedup();
        let label = tokens.join("_");
        Self {
            key: hash_key(&label),
            label,
            tokens,
        }
    }

    /// Signature for a fault no classifier recognized. Keyed by the raw
    /// error text, so distinct unknown faults stay distinct.
    pub fn unknown(raw: &str) -> Self {
        Self {
            key: hash_key(raw),
            label: "unknown_fault".to_string(),
            tokens: vec!["unknown_fault".to_string()],
        }
    }
}

fn hash_key(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// A fault domain's contribution to the fix cache: signature derivation and
/// prompt construction.
pub trait RemedyStrategy: Send + Sync {
    /// Short domain name for logs (`"code"`, `"security"`).
    fn domain(&self) -> &'static str;

    /// Classify a fault into its cache signature.
    fn derive_signature(&self, error: &str, input: &str) -> FaultSignature;

    /// Build the generation prompt for a fault with no cached remedy.
    fn build_request(&self, report: &FaultReport) -> GenerateRequest;

    /// JSON key holding the code artifact in a well-formed model response.
    fn artifact_field(&self) -> &'static str;
}

/// Strategy for crash-class bugs (division, parsing, unbounded input).
#[derive(Debug, Default)]
pub struct CodeRemedy {
    bugs: BugRegistry,
}

impl CodeRemedy {
    /// New strategy with the built-in bug registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemedyStrategy for CodeRemedy {
    fn domain(&self) -> &'static str {
        "code"
    }

    fn derive_signature(&self, error: &str, input: &str) -> FaultSignature {
        let lower = error.to_lowercase();
        let mut tokens = Vec::new();
        if lower.contains("division") && lower.contains("zero") {
            tokens.push(BugKind::DivisionByZero.label().to_string());
        }
        if lower.contains("malformed") || lower.contains("parse") {
            tokens.push(BugKind::MalformedPayload.label().to_string());
        }
        if lower.contains("memory") || lower.contains("overflow") || lower.contains("oversized") {
            tokens.push(BugKind::OversizedInput.label().to_string());
        }
        if let Some(signature) = self.bugs.first_match(input) {
            tokens.push(signature.kind.input_token().to_string());
        }
        if tokens.is_empty() {
            return FaultSignature::unknown(error);
        }
        FaultSignature::from_tokens(tokens)
    }

    fn build_request(&self, report: &FaultReport) -> GenerateRequest {
        let hint = self
            .bugs
            .first_match(&report.input)
            .map(|signature| format!("\nKnown weakness: the function {}.", signature.description))
            .unwrap_or_default();
        let prompt = format!(
            "BUG ANALYSIS AND FIX GENERATION\n\n\
             Error: {}\nInput that caused the error: {}\nFunction code:\n{}\n{hint}\n\
             Provide:\n1. Root cause of the bug\n2. A description of the fix\n\
             3. Corrected code that handles this case\n\n\
             Return as JSON with keys: root_cause, fix_description, corrected_code.",
            report.error, report.input, report.context
        );
        GenerateRequest::new(prompt)
            .with_system("You are a senior engineer debugging production code.")
            .with_max_tokens(800)
    }

    fn artifact_field(&self) -> &'static str {
        "corrected_code"
    }
}

/// Strategy for injection-class attacks.
#[derive(Debug, Default)]
pub struct SecurityRemedy {
    attacks: AttackRegistry,
}

impl SecurityRemedy {
    /// New strategy with the built-in attack registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemedyStrategy for SecurityRemedy {
    fn domain(&self) -> &'static str {
        "security"
    }

    fn derive_signature(&self, error: &str, input: &str) -> FaultSignature {
        let found = self.attacks.detect(input);
        if found.is_empty() {
            return FaultSignature::unknown(error);
        }
        FaultSignature::from_tokens(
            found.iter().map(|kind| kind.token().to_string()).collect(),
        )
    }

    fn build_request(&self, report: &FaultReport) -> GenerateRequest {
        let found = self.attacks.detect(&report.input);
        let (types, severity, countermeasures) = if found.is_empty() {
            (
                "unclassified".to_string(),
                Severity::High,
                "Defense in depth".to_string(),
            )
        } else {
            let types = found
                .iter()
                .map(|kind| kind.label())
                .collect::<Vec<_>>()
                .join(", ");
            let severity = found
                .iter()
                .map(|kind| kind.severity())
                .max()
                .unwrap_or(Severity::High);
            let countermeasures = found
                .iter()
                .map(|kind| kind.countermeasures())
                .collect::<Vec<_>>()
                .join("; ");
            (types, severity, countermeasures)
        };

        let prompt = format!(
            "SECURITY ATTACK ANALYSIS AND DEFENSE GENERATION\n\n\
             Attack type: {types}\nSeverity: {severity}\nKnown countermeasures: {countermeasures}\n\
             Attack input: {}\nVulnerable code:\n{}\n\n\
             Requirements:\n1. Analyze how the attack works\n2. Describe the defense strategy\n\
             3. Provide secure code that blocks this attack class\n\n\
             Return as JSON with keys: analysis, defense_strategy, secure_code.",
            truncate_chars(&report.input, 100),
            report.context
        );
        GenerateRequest::new(prompt)
            .with_system("You are a senior security engineer fixing vulnerabilities.")
            .with_max_tokens(1000)
    }

    fn artifact_field(&self) -> &'static str {
        "secure_code"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_signature_same_class_different_inputs() {
        let strategy = CodeRemedy::new();
        let a = strategy.derive_signature(
            "division by zero for input: special_case_7",
            "special_case_7",
        );
        let b = strategy.derive_signature(
            "division by zero for input: special_case_42",
            "special_case_42",
        );
        assert_eq!(a.key, b.key);
        assert_eq!(a.label, "division_by_zero_special_case_number");
    }

    #[test]
    fn test_code_signature_distinguishes_classes() {
        let strategy = CodeRemedy::new();
        let division = strategy.derive_signature("division by zero for input: x", "x");
        let parse = strategy.derive_signature("malformed payload could not be parsed: y", "y");
        let memory =
            strategy.derive_signature("memory overflow while processing oversized input: z", "z");
        assert_ne!(division.key, parse.key);
        assert_ne!(parse.key, memory.key);
        assert_ne!(division.key, memory.key);
    }

    #[test]
    fn test_code_signature_tokens_sorted_and_deduped() {
        let strategy = CodeRemedy::new();
        // "malformed ... parsed" hits both keywords of one class: one token.
        let sig = strategy.derive_signature("malformed payload could not be parsed: q", "q");
        assert_eq!(sig.tokens, vec!["malformed_payload"]);

        let multi = strategy.derive_signature(
            "static analysis flagged division_by_zero, oversized_input in f",
            "case-3",
        );
        assert_eq!(multi.tokens, vec!["division_by_zero", "oversized_input"]);
    }

    #[test]
    fn test_unknown_faults_keyed_by_error_text() {
        let strategy = CodeRemedy::new();
        let a = strategy.derive_signature("segfault in libfoo", "x");
        let b = strategy.derive_signature("stack exhausted", "x");
        assert_eq!(a.label, "unknown_fault");
        assert_eq!(b.label, "unknown_fault");
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_security_signature_from_payload_classes() {
        let strategy = SecurityRemedy::new();
        let a = strategy.derive_signature("attack detected", "admin' OR '1'='1");
        let b = strategy.derive_signature("attack detected", "root' OR '2'='2");
        assert_eq!(a.key, b.key);
        assert_eq!(a.label, "credential_sql");

        let script = strategy.derive_signature("attack detected", "<script>alert(1)</script>");
        assert_eq!(script.label, "script");
        assert_ne!(script.key, a.key);
    }

    #[test]
    fn test_prompts_lead_with_their_domain_header() {
        let report = FaultReport {
            error: "division by zero for input: special_case_7".to_string(),
            input: "special_case_7".to_string(),
            context: "fn f() {}".to_string(),
        };
        let request = CodeRemedy::new().build_request(&report);
        assert!(request.prompt.starts_with("BUG ANALYSIS AND FIX GENERATION"));
        assert!(request.prompt.contains("Known weakness"));
        assert_eq!(request.max_tokens, 800);

        let report = FaultReport {
            error: "attack detected".to_string(),
            input: "../../etc/passwd".to_string(),
            context: "fn serve() {}".to_string(),
        };
        let request = SecurityRemedy::new().build_request(&report);
        assert!(request
            .prompt
            .starts_with("SECURITY ATTACK ANALYSIS AND DEFENSE GENERATION"));
        assert!(request.prompt.contains("path_traversal"));
        assert!(request.prompt.contains("canonicalization"));
        assert_eq!(request.max_tokens, 1000);
    }

    #[test]
    fn test_security_prompt_truncates_long_payloads() {
        let report = FaultReport {
            error: "attack detected".to_string(),
            input: format!("<script>{}</script>", "x".repeat(500)),
            context: String::new(),
        };
        let request = SecurityRemedy::new().build_request(&report);
        // The raw 500-char payload must not appear verbatim.
        assert!(!request.prompt.contains(&"x".repeat(200)));
    }

    #[test]
    fn test_hash_key_is_16_hex_chars() {
        let sig = FaultSignature::from_tokens(vec!["a".to_string()]);
        assert_eq!(sig.key.len(), 16);
        assert!(sig.key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
