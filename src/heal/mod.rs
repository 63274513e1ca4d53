//! # Healing subsystem
//!
//! Everything that turns a fault into a remedy:
//!
//! - [`HealingPipeline`] — the diagnose → plan → execute loop. Each phase
//!   asks the configured [`crate::llm::TextGenerator`] and degrades to
//!   static fallback content on any failure, so a healing attempt never
//!   propagates an error.
//! - [`FixCache`] — signature-keyed memo of generated code artifacts. A
//!   [`RemedyStrategy`] (code bugs or security attacks) derives the
//!   signature and builds the generation prompt; the cache guarantees one
//!   generation per fault class.
//! - [`validate_fix`] — heuristic quality gate over generated artifacts.

mod cache;
mod pipeline;
mod remedy;
mod validate;

pub use cache::{
    CacheError, CacheStats, CategoryStats, FixArtifact, FixCache, RemedyAction, RemedyOutcome,
};
pub use pipeline::{
    Diagnosis, ExecutionReport, HealingConfig, HealingOperation, HealingPipeline, HealingPlan,
    HealingStats, PreventiveAdvice, Provenance,
};
pub use remedy::{CodeRemedy, FaultReport, FaultSignature, RemedyStrategy, SecurityRemedy};
pub use validate::{validate_fix, ValidationReport};

/// Strip a single leading/trailing markdown code fence, if present.
///
/// Models wrap JSON answers in ```` ```json ```` fences often enough that
/// every parse site wants this.
pub(crate) fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}
