//! Signature-keyed cache of generated fixes and defenses.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::remedy::{CodeRemedy, FaultReport, FaultSignature, RemedyStrategy, SecurityRemedy};
use crate::llm::{LlmError, TextGenerator};
use crate::{truncate_chars, unix_now};

/// Errors from the fix cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The generation call behind a cache miss failed.
    #[error("fix generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// How a remediation request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemedyAction {
    /// A cached artifact for this signature was reused.
    AppliedExisting,
    /// A new artifact was generated and cached.
    GeneratedNew,
}

/// A generated code artifact, as stored in the cache.
#[derive(Debug, Clone, Serialize)]
pub struct FixArtifact {
    /// The fault class this artifact remedies.
    pub signature: FaultSignature,
    /// The code itself.
    pub code: String,
    /// The full structured model response, when it parsed as JSON.
    pub analysis: Option<Value>,
    /// The fault text that triggered generation.
    pub source_error: String,
    /// The input that triggered generation, truncated.
    pub trigger_input: String,
    /// Unix seconds.
    pub generated_at: u64,
}

/// Result of [`FixCache::remediate`].
#[derive(Debug, Clone, Serialize)]
pub struct RemedyOutcome {
    /// Cache hit or fresh generation.
    pub action: RemedyAction,
    /// The artifact to apply.
    pub artifact: FixArtifact,
}

/// Per-class-token observation bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    /// Unix seconds of the first observation.
    pub first_seen: u64,
    /// Remediation requests that carried this token.
    pub occurrences: u64,
    /// The most recent triggering input, truncated.
    pub last_input: String,
}

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    /// Distinct fault signatures with a cached artifact.
    pub entries: usize,
    /// Cache misses that generated a new artifact.
    pub generated: u64,
    /// Requests satisfied from cache.
    pub reused: u64,
    /// Distinct class tokens observed.
    pub categories: usize,
}

/// Lookup-before-generate memo of remedies, one artifact per fault
/// signature.
///
/// Safe for concurrent use. Concurrent misses on the same signature may
/// each call the generator, but only the first insert wins; losers are
/// reported as cache hits so `generated` counts distinct artifacts.
pub struct FixCache {
    strategy: Box<dyn RemedyStrategy>,
    generator: Arc<dyn TextGenerator>,
    entries: DashMap<String, FixArtifact>,
    ledger: DashMap<String, CategoryStats>,
    generated: AtomicU64,
    reused: AtomicU64,
}

impl FixCache {
    /// Cache over an explicit strategy.
    pub fn new(strategy: Box<dyn RemedyStrategy>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            strategy,
            generator,
            entries: DashMap::new(),
            ledger: DashMap::new(),
            generated: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Cache for crash-class bugs.
    pub fn for_code(generator: Arc<dyn TextGenerator>) -> Self {
        Self::new(Box::new(CodeRemedy::new()), generator)
    }

    /// Cache for injection-class attacks.
    pub fn for_security(generator: Arc<dyn TextGenerator>) -> Self {
        Self::new(Box::new(SecurityRemedy::new()), generator)
    }

    /// The strategy's domain name.
    pub fn domain(&self) -> &'static str {
        self.strategy.domain()
    }

    /// Return the remedy for a fault, generating it on first sight.
    ///
    /// # Errors
    ///
    /// [`CacheError::Generation`] if the fault is unseen and the generator
    /// fails; nothing is cached in that case.
    pub async fn remediate(&self, report: &FaultReport) -> Result<RemedyOutcome, CacheError> {
        let signature = self.strategy.derive_signature(&report.error, &report.input);
        self.touch_ledger(&signature, &report.input);

        if let Some(existing) = self.entries.get(&signature.key) {
            let artifact = existing.value().clone();
            drop(existing);
            self.reused.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                domain = self.strategy.domain(),
                signature = %signature.label,
                "remedy cache hit"
            );
            return Ok(RemedyOutcome {
                action: RemedyAction::AppliedExisting,
                artifact,
            });
        }

        let request = self.strategy.build_request(report);
        let response = self.generator.generate(&request).await?;
        let (code, analysis) = extract_artifact(&response, self.strategy.artifact_field());
        let artifact = FixArtifact {
            signature: signature.clone(),
            code,
            analysis,
            source_error: report.error.clone(),
            trigger_input: truncate_chars(&report.input, 100),
            generated_at: unix_now(),
        };

        // Concurrent misses race here; the first insert wins.
        match self.entries.entry(signature.key.clone()) {
            Entry::Occupied(slot) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                Ok(RemedyOutcome {
                    action: RemedyAction::AppliedExisting,
                    artifact: slot.get().clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(artifact.clone());
                self.generated.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    domain = self.strategy.domain(),
                    signature = %signature.label,
                    "remedy generated"
                );
                Ok(RemedyOutcome {
                    action: RemedyAction::GeneratedNew,
                    artifact,
                })
            }
        }
    }

    /// The cached artifact for a fault, if one exists.
    pub fn lookup(&self, error: &str, input: &str) -> Option<FixArtifact> {
        let signature = self.strategy.derive_signature(error, input);
        self.entries
            .get(&signature.key)
            .map(|entry| entry.value().clone())
    }

    /// Aggregate counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            generated: self.generated.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            categories: self.ledger.len(),
        }
    }

    /// Per-token observation stats.
    pub fn category_stats(&self) -> HashMap<String, CategoryStats> {
        self.ledger
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn touch_ledger(&self, signature: &FaultSignature, input: &str) {
        let now = unix_now();
        for token in &signature.tokens {
            self.ledger
                .entry(token.clone())
                .and_modify(|stats| {
                    stats.occurrences += 1;
                    stats.last_input = truncate_chars(input, 100);
                })
                .or_insert_with(|| CategoryStats {
                    first_seen: now,
                    occurrences: 1,
                    last_input: truncate_chars(input, 100),
                });
        }
    }
}

/// Pull the code artifact out of a model response.
///
/// Well-formed responses are JSON objects carrying the artifact under
/// `field`; anything else is treated as raw code.
fn extract_artifact(response: &str, field: &str) -> (String, Option<Value>) {
    let cleaned = super::strip_code_fences(response);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) if value.is_object() => {
            let code = value
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or(cleaned)
                .to_string();
            (code, Some(value))
        }
        _ => (cleaned.to_string(), None),
    }
}
