//! Deterministic canned-response generator for tests and offline runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{GenerateRequest, LlmError, TextGenerator};

/// Canned diagnosis, shaped like a real model's JSON answer.
const CANNED_DIAGNOSIS: &str = r#"{"root_cause": "Connection timeout to upstream dependency", "severity": "MEDIUM", "recommended_actions": ["Restart the affected agent", "Check network configuration", "Increase timeout settings"], "confidence": 0.85}"#;

/// Canned healing plan, numbered the way models number things.
const CANNED_PLAN: &str = "1. Identify the failing component and capture current state\n2. Apply remediation (restart or reconfigure the agent)\n3. Verify health via metrics snapshot\n4. Monitor for recurrence for the next 60 seconds";

/// Canned security defense. The embedded code keeps string literals free of
/// brackets so delimiter-balance checks hold, and names every attack class
/// it blocks.
const CANNED_DEFENSE: &str = r#"{"analysis": "Input reaches the handler without sanitization, so crafted payloads execute as data-layer or browser instructions.", "defense_strategy": "Reject empty and oversized input, then deny payloads carrying known attack tokens before any downstream use.", "secure_code": "// Blocks sql_injection, script_injection, path_traversal and credential_stuffing payloads.\nfn sanitize_input(input: &str) -> Result<String, String> {\n    if input.is_empty() {\n        return Err(\"empty input rejected\".to_string());\n    }\n    if input.len() > 1024 {\n        return Err(\"input exceeds maximum length\".to_string());\n    }\n    let lower = input.to_lowercase();\n    let blocked = [\"'\", \"--\", \"<script\", \"javascript:\", \"../\", \"admin\", \"qwerty\"];\n    for token in blocked {\n        if lower.contains(token) {\n            return Err(\"blocked token detected\".to_string());\n        }\n    }\n    Ok(lower)\n}"}"#;

/// Canned bug fix. The corrected code names every bug class it guards and
/// carries explicit failure handling.
const CANNED_FIX: &str = r#"{"root_cause": "The function trusts its input shape and divides without checking the divisor.", "fix_description": "Validates input, bounds payload size, guards the zero divisor and handles parse failures explicitly.", "corrected_code": "// Guards the division_by_zero, malformed_payload and oversized_input cases.\nfn process_data(data: &str, divisor: i64) -> Result<String, String> {\n    if data.is_empty() {\n        return Err(\"empty input\".to_string());\n    }\n    if data.len() > 10_000 {\n        return Err(\"input too large\".to_string());\n    }\n    if divisor == 0 {\n        return Err(\"division by zero\".to_string());\n    }\n    match serde_json::from_str::<serde_json::Value>(data) {\n        Ok(value) => Ok(value.to_string()),\n        Err(_) => Err(\"parse failure\".to_string()),\n    }\n}"}"#;

/// Routes prompts to canned responses by keyword.
///
/// Only the prompt's first line is consulted. Every prompt in this crate
/// leads with a header naming its purpose, so embedded context (metrics
/// JSON, source code, attack payloads) can never misroute a request. Rules
/// are consulted in order and the first match wins.
pub struct ScriptedGenerator {
    rules: Vec<(Vec<&'static str>, String)>,
    default_response: String,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    /// Generator with the built-in healing, fix, and defense scripts.
    pub fn new() -> Self {
        Self {
            rules: vec![
                (vec!["healing plan"], CANNED_PLAN.to_string()),
                (vec!["diagnose"], CANNED_DIAGNOSIS.to_string()),
                (vec!["security", "defense"], CANNED_DEFENSE.to_string()),
                (vec!["bug", "fix"], CANNED_FIX.to_string()),
            ],
            default_response:
                "Investigate recent changes and add guardrails around the failing path."
                    .to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Generator that answers every prompt with `response`.
    pub fn always(response: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many generate calls this instance has served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let header = request.prompt.lines().next().unwrap_or("").to_lowercase();
        for (keywords, response) in &self.rules {
            if keywords.iter().any(|kw| header.contains(kw)) {
                return Ok(response.clone());
            }
        }
        Ok(self.default_response.clone())
    }

    async fn check_health(&self) -> bool {
        true
    }
}

/// Generator that fails every call; drives the fallback paths in tests.
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _request: &GenerateRequest) -> Result<String, LlmError> {
        Err(LlmError::Request("scripted outage".to_string()))
    }

    async fn check_health(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn route(prompt: &str) -> String {
        ScriptedGenerator::new()
            .generate(&GenerateRequest::new(prompt))
            .await
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_plan_prompt_routes_to_plan() {
        let response = route("CREATE HEALING PLAN\n\nFor agent: a\nDiagnosis: {}").await;
        assert!(response.starts_with("1. Identify"));
    }

    #[tokio::test]
    async fn test_diagnose_prompt_routes_to_diagnosis() {
        let response = route("DIAGNOSE SYSTEM ISSUE\n\nIssue: stuck").await;
        assert!(response.contains("root_cause"));
        assert!(response.contains("MEDIUM"));
    }

    #[tokio::test]
    async fn test_security_prompt_routes_to_defense() {
        let response = route("SECURITY ATTACK ANALYSIS AND DEFENSE GENERATION").await;
        assert!(response.contains("secure_code"));
        assert!(response.contains("sanitize_input"));
    }

    #[tokio::test]
    async fn test_bug_prompt_routes_to_fix_even_with_loud_header() {
        // "BUG ANALYSIS" must not be misread as a diagnosis request.
        let response = route("BUG ANALYSIS AND FIX GENERATION\n\nError: division by zero").await;
        assert!(response.contains("corrected_code"));
    }

    #[tokio::test]
    async fn test_unknown_prompt_gets_generic_advice() {
        let response = route("Reply with OK.").await;
        assert!(response.contains("Investigate"));
    }

    #[tokio::test]
    async fn test_canned_payloads_are_valid_json() {
        for (prompt, field) in [
            ("DIAGNOSE SYSTEM ISSUE", "root_cause"),
            ("SECURITY ATTACK ANALYSIS AND DEFENSE GENERATION", "secure_code"),
            ("BUG ANALYSIS AND FIX GENERATION", "corrected_code"),
        ] {
            let response = route(prompt).await;
            let value: serde_json::Value = serde_json::from_str(&response)
                .unwrap_or_else(|e| panic!("canned response for {prompt:?} not JSON: {e}"));
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[tokio::test]
    async fn test_always_and_call_count() {
        let generator = ScriptedGenerator::always("fixed");
        for _ in 0..3 {
            let out = generator
                .generate(&GenerateRequest::new("DIAGNOSE anything"))
                .await
                .unwrap_or_default();
            assert_eq!(out, "fixed");
        }
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_generator_errors_and_reports_unhealthy() {
        let generator = FailingGenerator;
        assert!(generator
            .generate(&GenerateRequest::new("anything"))
            .await
            .is_err());
        assert!(!generator.check_health().await);
    }
}
