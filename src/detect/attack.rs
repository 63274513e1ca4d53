//! Attack payload classification.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Severity;

/// Attack categories the security handlers recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// SQL metacharacters, tautologies, or data-manipulation verbs.
    SqlInjection,
    /// Script tags, javascript: URLs, or DOM-poking payloads.
    ScriptInjection,
    /// Parent-directory escapes or well-known sensitive paths.
    PathTraversal,
    /// Privileged usernames or top-of-the-wordlist passwords.
    CredentialStuffing,
}

impl AttackKind {
    /// Stable snake_case label for results, logs, and benchmark output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SqlInjection => "sql_injection",
            Self::ScriptInjection => "script_injection",
            Self::PathTraversal => "path_traversal",
            Self::CredentialStuffing => "credential_stuffing",
        }
    }

    /// Short token used in defense cache signatures.
    pub fn token(&self) -> &'static str {
        match self {
            Self::SqlInjection => "sql",
            Self::ScriptInjection => "script",
            Self::PathTraversal => "path",
            Self::CredentialStuffing => "credential",
        }
    }

    /// How bad an unblocked instance of this attack is.
    pub fn severity(&self) -> Severity {
        match self {
            Self::SqlInjection => Severity::Critical,
            Self::ScriptInjection => Severity::High,
            Self::PathTraversal => Severity::High,
            Self::CredentialStuffing => Severity::Medium,
        }
    }

    /// Standard countermeasures, fed into defense-generation prompts.
    pub fn countermeasures(&self) -> &'static str {
        match self {
            Self::SqlInjection => "Parameterized queries, input validation, least-privilege DB accounts",
            Self::ScriptInjection => "Output encoding, content security policy, HTML sanitization",
            Self::PathTraversal => "Path canonicalization, allowlisted roots, reject parent references",
            Self::CredentialStuffing => "Rate limiting, credential denylists, multi-factor authentication",
        }
    }

    /// All categories, in detection order.
    pub fn all() -> [AttackKind; 4] {
        [
            Self::SqlInjection,
            Self::ScriptInjection,
            Self::PathTraversal,
            Self::CredentialStuffing,
        ]
    }
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies payloads into zero or more attack categories.
///
/// A payload can land in several categories at once (`admin' OR '1'='1` is
/// both SQL injection and credential stuffing). Within a category the first
/// matching pattern decides; patterns after it are not consulted.
#[derive(Debug)]
pub struct AttackRegistry {
    sql: Vec<Regex>,
    script: Vec<Regex>,
    path: Vec<Regex>,
    credential: Vec<Regex>,
}

impl AttackRegistry {
    /// Build the registry with the built-in pattern sets.
    pub fn new() -> Self {
        Self {
            sql: vec![
                super::compile(r"(?i)([';]|--|\bunion\b|\bselect\b)"),
                super::compile(r"(?i)\b(drop|delete|insert|update)\b"),
                super::compile(r"(?i)or\s+['\d]+\s*=\s*['\d]+"),
            ],
            script: vec![
                super::compile(r"(?i)(<script|javascript:|onload=)"),
                super::compile(r"(?i)(alert\s*\(|document\.cookie)"),
            ],
            path: vec![
                super::compile(r"(\.\./|\.\.\\)"),
                super::compile(r"(?i)(/etc/passwd|c:\\windows)"),
            ],
            credential: vec![
                super::compile(r"(?i)\b(admin|root)\b"),
                super::compile(r"(?i)\b(password|123456|qwerty)\b"),
            ],
        }
    }

    /// Every category whose patterns match the input, in fixed order.
    pub fn detect(&self, input: &str) -> Vec<AttackKind> {
        let mut found = Vec::new();
        if self.sql.iter().any(|p| p.is_match(input)) {
            found.push(AttackKind::SqlInjection);
        }
        if self.script.iter().any(|p| p.is_match(input)) {
            found.push(AttackKind::ScriptInjection);
        }
        if self.path.iter().any(|p| p.is_match(input)) {
            found.push(AttackKind::PathTraversal);
        }
        if self.credential.iter().any(|p| p.is_match(input)) {
            found.push(AttackKind::CredentialStuffing);
        }
        found
    }
}

impl Default for AttackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
