//! Known bug classes and the input patterns that trigger them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The bug classes the processing handlers know how to crash on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugKind {
    /// Arithmetic on a zero divisor.
    DivisionByZero,
    /// Input that fails to parse as the expected format.
    MalformedPayload,
    /// Input far beyond the size the code was written for.
    OversizedInput,
}

impl BugKind {
    /// Stable snake_case label used in cache signatures, task results, and
    /// benchmark expectations.
    pub fn label(&self) -> &'static str {
        match self {
            Self::DivisionByZero => "division_by_zero",
            Self::MalformedPayload => "malformed_payload",
            Self::OversizedInput => "oversized_input",
        }
    }

    /// The input token family that triggers this bug in [`super::BugRegistry`].
    pub fn input_token(&self) -> &'static str {
        match self {
            Self::DivisionByZero => "special_case_number",
            Self::MalformedPayload => "malformed_json",
            Self::OversizedInput => "large_dataset",
        }
    }

    /// One-line description used in fix-generation prompts.
    pub fn description(&self) -> &'static str {
        match self {
            Self::DivisionByZero => "divides by a derived value without checking it for zero",
            Self::MalformedPayload => "parses untrusted input without handling the failure case",
            Self::OversizedInput => "allocates proportionally to input size with no upper bound",
        }
    }

    /// Render the error message this bug produces for a given input.
    pub fn detail(&self, input: &str) -> String {
        match self {
            Self::DivisionByZero => format!("division by zero for input: {input}"),
            Self::MalformedPayload => {
                format!("malformed payload could not be parsed: {input}")
            }
            Self::OversizedInput => {
                format!("memory overflow while processing oversized input: {input}")
            }
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A bug class paired with the input pattern that triggers it.
#[derive(Debug)]
pub struct BugSignature {
    /// Which bug class this signature detects.
    pub kind: BugKind,
    /// Inputs matching this pattern trigger the bug.
    pub trigger: Regex,
    /// What the buggy code does wrong.
    pub description: &'static str,
}

/// Ordered collection of known bug signatures.
///
/// Order matters: the first matching signature wins, so more specific
/// patterns must come first.
#[derive(Debug)]
pub struct BugRegistry {
    signatures: Vec<BugSignature>,
}

impl BugRegistry {
    /// Build the registry with the built-in signatures.
    pub fn new() -> Self {
        let signatures = vec![
            BugSignature {
                kind: BugKind::DivisionByZero,
                trigger: super::compile(r"special_case_\d+"),
                description: BugKind::DivisionByZero.description(),
            },
            BugSignature {
                kind: BugKind::MalformedPayload,
                trigger: super::compile(r"malformed_json"),
                description: BugKind::MalformedPayload.description(),
            },
            BugSignature {
                kind: BugKind::OversizedInput,
                trigger: super::compile(r"large_dataset_\d+"),
                description: BugKind::OversizedInput.description(),
            },
        ];
        Self { signatures }
    }

    /// First signature whose trigger matches the input, if any.
    pub fn first_match(&self, input: &str) -> Option<&BugSignature> {
        self.signatures.iter().find(|sig| sig.trigger.is_match(input))
    }

    /// All registered signatures, in match order.
    pub fn signatures(&self) -> &[BugSignature] {
        &self.signatures
    }
}

impl Default for BugRegistry {
    fn default() -> Self {
        Self::new()
    }
}
