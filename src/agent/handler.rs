//! Task handlers: the pluggable work units agents execute.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::detect::{AttackKind, AttackRegistry, BugKind, BugRegistry};
use crate::{truncate_chars, unix_now, TaskRequest};

/// How a task execution failed.
///
/// The variant decides which remedy strategy the healing layer reaches for.
#[derive(Error, Debug, Clone)]
pub enum TaskFault {
    /// A known bug class fired on this input.
    #[error("{detail}")]
    Bug {
        /// Which bug class.
        kind: BugKind,
        /// Human-readable failure message, embeds the triggering input.
        detail: String,
    },

    /// The input classified as an attack with no registered defense.
    #[error("{kind} attack detected in input: {detail}")]
    SecurityViolation {
        /// Which attack class.
        kind: AttackKind,
        /// The offending input, truncated.
        detail: String,
    },

    /// Infrastructure-level failure unrelated to the input's content.
    #[error("{0}")]
    Transient(String),
}

/// The work an agent performs per task.
///
/// Implementations must be safe to call concurrently; per-handler state
/// (fix tables, rate-limit windows) uses interior mutability.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Transform the task into a result value or a classified fault.
    async fn transform(&self, task: &TaskRequest) -> Result<Value, TaskFault>;
}

/// Echoes the task's `data` field. Never fails.
#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn transform(&self, task: &TaskRequest) -> Result<Value, TaskFault> {
        let data = task.get_str("data").unwrap_or_default();
        Ok(json!({ "echo": data }))
    }
}

/// Fails every task with a fixed transient error.
#[derive(Debug)]
pub struct FailingHandler {
    message: String,
}

impl FailingHandler {
    /// Fail with a custom message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingHandler {
    fn default() -> Self {
        Self::new("simulated downstream failure")
    }
}

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn transform(&self, _task: &TaskRequest) -> Result<Value, TaskFault> {
        Err(TaskFault::Transient(self.message.clone()))
    }
}

/// A remedy (fix or defense) registered on a handler, with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredRemedy {
    /// The generated code artifact.
    pub code: String,
    /// Unix seconds when it was registered.
    pub registered_at: u64,
}

impl RegisteredRemedy {
    fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            registered_at: unix_now(),
        }
    }
}

/// Data processor that crashes on known input shapes until a fix for the
/// matching bug class is registered.
#[derive(Debug, Default)]
pub struct BuggyProcessor {
    bugs: BugRegistry,
    fixes: DashMap<BugKind, RegisteredRemedy>,
}

impl BuggyProcessor {
    /// New processor with no fixes applied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fix; subsequent matching inputs succeed as patched.
    pub fn register_fix(&self, kind: BugKind, code: impl Into<String>) {
        self.fixes.insert(kind, RegisteredRemedy::new(code));
    }

    /// Whether a fix for this bug class is in place.
    pub fn has_fix(&self, kind: BugKind) -> bool {
        self.fixes.contains_key(&kind)
    }

    /// Number of distinct bug classes fixed so far.
    pub fn fix_count(&self) -> usize {
        self.fixes.len()
    }
}

#[async_trait]
impl TaskHandler for BuggyProcessor {
    async fn transform(&self, task: &TaskRequest) -> Result<Value, TaskFault> {
        let data = task.get_str("data").unwrap_or_default();

        if let Some(signature) = self.bugs.first_match(data) {
            if self.fixes.contains_key(&signature.kind) {
                return Ok(json!({
                    "result": format!("processed: {data}"),
                    "patched": true,
                    "pattern": signature.kind.label(),
                }));
            }
            return Err(TaskFault::Bug {
                kind: signature.kind,
                detail: signature.kind.detail(data),
            });
        }

        let result = match task.get_str("operation") {
            Some("reverse") => data.chars().rev().collect::<String>(),
            Some("uppercase") => data.to_uppercase(),
            Some("count") => data.chars().count().to_string(),
            _ => format!("processed: {data}"),
        };
        Ok(json!({ "result": result }))
    }
}

/// One observed attack attempt, kept in a bounded recent-history ring.
#[derive(Debug, Clone, Serialize)]
pub struct AttackAttempt {
    /// Every attack class the input matched.
    pub kinds: Vec<AttackKind>,
    /// The input, truncated for storage.
    pub input: String,
    /// Whether registered defenses covered every matched class.
    pub blocked: bool,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Security posture summary for a [`VulnerableEcho`] handler.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    /// Total attack classifications observed.
    pub attacks_detected: u64,
    /// Classifications that were blocked by a registered defense.
    pub attacks_blocked: u64,
    /// Distinct attack classes with a defense in place.
    pub defenses_registered: usize,
    /// `defenses_registered` over the number of known attack classes.
    pub protection_rate: f64,
    /// Most recent attempts, newest last.
    pub recent_attempts: Vec<AttackAttempt>,
}

const ATTEMPT_HISTORY_LIMIT: usize = 200;
const RECENT_ATTEMPTS_SHOWN: usize = 10;

/// Echo service with no input sanitization until defenses are registered.
///
/// An input matching attack classes fails with the first *undefended* class;
/// once every matched class has a registered defense the input is reported
/// as blocked instead.
#[derive(Debug, Default)]
pub struct VulnerableEcho {
    attacks: AttackRegistry,
    defenses: DashMap<AttackKind, RegisteredRemedy>,
    attempts: Mutex<VecDeque<AttackAttempt>>,
    detected_total: AtomicU64,
    blocked_total: AtomicU64,
}

impl VulnerableEcho {
    /// New handler with no defenses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a defense for one attack class.
    pub fn register_defense(&self, kind: AttackKind, code: impl Into<String>) {
        self.defenses.insert(kind, RegisteredRemedy::new(code));
    }

    /// Whether a defense for this attack class is in place.
    pub fn has_defense(&self, kind: AttackKind) -> bool {
        self.defenses.contains_key(&kind)
    }

    /// Current security posture.
    pub fn security_status(&self) -> SecurityStatus {
        let attempts = self.attempts.lock();
        let recent: Vec<AttackAttempt> = attempts
            .iter()
            .rev()
            .take(RECENT_ATTEMPTS_SHOWN)
            .rev()
            .cloned()
            .collect();
        SecurityStatus {
            attacks_detected: self.detected_total.load(Ordering::Relaxed),
            attacks_blocked: self.blocked_total.load(Ordering::Relaxed),
            defenses_registered: self.defenses.len(),
            protection_rate: self.defenses.len() as f64 / AttackKind::all().len() as f64,
            recent_attempts: recent,
        }
    }

    fn record_attempt(&self, kinds: Vec<AttackKind>, input: &str, blocked: bool) {
        let mut attempts = self.attempts.lock();
        if attempts.len() >= ATTEMPT_HISTORY_LIMIT {
            attempts.pop_front();
        }
        attempts.push_back(AttackAttempt {
            kinds,
            input: truncate_chars(input, 50),
            blocked,
            timestamp: unix_now(),
        });
    }
}

#[async_trait]
impl TaskHandler for VulnerableEcho {
    async fn transform(&self, task: &TaskRequest) -> Result<Value, TaskFault> {
        let input = task
            .get_str("input")
            .or_else(|| task.get_str("data"))
            .unwrap_or_default();

        let found = self.attacks.detect(input);
        if !found.is_empty() {
            self.detected_total
                .fetch_add(found.len() as u64, Ordering::Relaxed);
            let undefended = found
                .iter()
                .copied()
                .find(|kind| !self.defenses.contains_key(kind));
            let blocked = undefended.is_none();
            self.record_attempt(found.clone(), input, blocked);

            if let Some(kind) = undefended {
                return Err(TaskFault::SecurityViolation {
                    kind,
                    detail: truncate_chars(input, 50),
                });
            }

            self.blocked_total
                .fetch_add(found.len() as u64, Ordering::Relaxed);
            let labels: Vec<&str> = found.iter().map(|kind| kind.label()).collect();
            return Ok(json!({
                "result": "Attack blocked",
                "protected": true,
                "attacks_detected": labels,
            }));
        }

        let result = match task.get_str("action") {
            Some("reverse") => input.chars().rev().collect::<String>(),
            _ => input.to_string(),
        };
        Ok(json!({ "result": result }))
    }
}

/// Seeded random fault source shared by flaky handlers.
///
/// Seeding makes failure sequences reproducible across test runs.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<StdRng>,
    rate: f64,
}

impl FaultInjector {
    /// Injector failing a `rate` fraction of calls, deterministically from
    /// `seed`.
    pub fn seeded(seed: u64, rate: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            rate: rate.clamp(0.0, 1.0),
        }
    }

    /// Injector that never fires.
    pub fn disabled() -> Self {
        Self::seeded(0, 0.0)
    }

    /// Roll the dice for one call.
    pub fn should_fail(&self) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        self.rng.lock().gen::<f64>() < self.rate
    }
}

const RATE_WINDOW_SECS: u64 = 60;
const RATE_MAX_PER_WINDOW: usize = 10;

/// Simulated upstream gateway with injected timeouts and per-client rate
/// limiting.
#[derive(Debug)]
pub struct FlakyGateway {
    injector: FaultInjector,
    window_secs: u64,
    max_per_window: usize,
    requests: DashMap<String, VecDeque<u64>>,
}

impl FlakyGateway {
    /// Gateway with the default limit (10 requests per client per 60s).
    pub fn new(injector: FaultInjector) -> Self {
        Self {
            injector,
            window_secs: RATE_WINDOW_SECS,
            max_per_window: RATE_MAX_PER_WINDOW,
            requests: DashMap::new(),
        }
    }

    /// Override the rate limit.
    pub fn with_rate_limit(mut self, max_per_window: usize, window_secs: u64) -> Self {
        self.max_per_window = max_per_window;
        self.window_secs = window_secs;
        self
    }
}

#[async_trait]
impl TaskHandler for FlakyGateway {
    async fn transform(&self, task: &TaskRequest) -> Result<Value, TaskFault> {
        if self.injector.should_fail() {
            return Err(TaskFault::Transient(
                "simulated gateway timeout".to_string(),
            ));
        }

        let client = task.get_str("client").unwrap_or("anonymous");
        let now = unix_now();
        let mut window = self.requests.entry(client.to_string()).or_default();
        while let Some(&oldest) = window.front() {
            if now.saturating_sub(oldest) >= self.window_secs {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.max_per_window {
            return Err(TaskFault::Transient(format!(
                "rate limit exceeded for client {client}"
            )));
        }
        window.push_back(now);

        Ok(json!({
            "status": 200,
            "endpoint": task.get_str("endpoint").unwrap_or("/"),
            "method": task.get_str("method").unwrap_or("GET"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(key: &str, value: &str) -> TaskRequest {
        TaskRequest::new().with(key, value)
    }

    #[tokio::test]
    async fn test_echo_handler_never_fails() {
        let handler = EchoHandler;
        let result = handler.transform(&task("data", "hello")).await;
        assert_eq!(
            result.unwrap_or_default(),
            json!({ "echo": "hello" })
        );
        assert!(handler.transform(&TaskRequest::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_buggy_processor_crashes_on_special_case() {
        let handler = BuggyProcessor::new();
        let err = handler.transform(&task("data", "special_case_7")).await.err();
        match err {
            Some(TaskFault::Bug { kind, detail }) => {
                assert_eq!(kind, BugKind::DivisionByZero);
                assert!(detail.contains("special_case_7"));
            }
            other => panic!("expected Bug fault, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buggy_processor_succeeds_after_fix() {
        let handler = BuggyProcessor::new();
        handler.register_fix(BugKind::DivisionByZero, "fn fixed() {}");
        let value = handler
            .transform(&task("data", "special_case_7"))
            .await
            .unwrap_or_default();
        assert_eq!(value["patched"], json!(true));
        assert_eq!(value["pattern"], json!("division_by_zero"));
        assert!(handler.has_fix(BugKind::DivisionByZero));
        assert_eq!(handler.fix_count(), 1);
    }

    #[tokio::test]
    async fn test_buggy_processor_fix_is_per_bug_class() {
        let handler = BuggyProcessor::new();
        handler.register_fix(BugKind::DivisionByZero, "fn fixed() {}");
        // Other bug classes still crash.
        assert!(handler
            .transform(&task("data", "malformed_json"))
            .await
            .is_err());
        assert!(handler
            .transform(&task("data", "large_dataset_500"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_buggy_processor_operations() {
        let handler = BuggyProcessor::new();
        let reversed = handler
            .transform(&TaskRequest::new().with("data", "abc").with("operation", "reverse"))
            .await
            .unwrap_or_default();
        assert_eq!(reversed["result"], json!("cba"));

        let upper = handler
            .transform(&TaskRequest::new().with("data", "abc").with("operation", "uppercase"))
            .await
            .unwrap_or_default();
        assert_eq!(upper["result"], json!("ABC"));

        let count = handler
            .transform(&TaskRequest::new().with("data", "abcd").with("operation", "count"))
            .await
            .unwrap_or_default();
        assert_eq!(count["result"], json!("4"));
    }

    #[tokio::test]
    async fn test_vulnerable_echo_rejects_undefended_attack() {
        let handler = VulnerableEcho::new();
        let err = handler
            .transform(&task("input", "<script>alert(1)</script>"))
            .await
            .err();
        match err {
            Some(TaskFault::SecurityViolation { kind, .. }) => {
                assert_eq!(kind, AttackKind::ScriptInjection);
            }
            other => panic!("expected SecurityViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_vulnerable_echo_blocks_once_defended() {
        let handler = VulnerableEcho::new();
        handler.register_defense(AttackKind::ScriptInjection, "fn sanitize() {}");
        let value = handler
            .transform(&task("input", "<script>alert(1)</script>"))
            .await
            .unwrap_or_default();
        assert_eq!(value["protected"], json!(true));
        assert_eq!(value["attacks_detected"], json!(["script_injection"]));
    }

    #[tokio::test]
    async fn test_vulnerable_echo_multi_class_needs_every_defense() {
        let handler = VulnerableEcho::new();
        // admin' OR '1'='1 is both sql_injection and credential_stuffing.
        handler.register_defense(AttackKind::SqlInjection, "fn sanitize() {}");
        let err = handler.transform(&task("input", "admin' OR '1'='1")).await.err();
        match err {
            Some(TaskFault::SecurityViolation { kind, .. }) => {
                assert_eq!(kind, AttackKind::CredentialStuffing);
            }
            other => panic!("expected SecurityViolation, got {other:?}"),
        }

        handler.register_defense(AttackKind::CredentialStuffing, "fn sanitize() {}");
        assert!(handler
            .transform(&task("input", "admin' OR '1'='1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_security_status_counts() {
        let handler = VulnerableEcho::new();
        let _ = handler.transform(&task("input", "<script>alert(1)</script>")).await;
        handler.register_defense(AttackKind::ScriptInjection, "fn sanitize() {}");
        let _ = handler.transform(&task("input", "<script>alert(1)</script>")).await;

        let status = handler.security_status();
        assert_eq!(status.attacks_detected, 2);
        assert_eq!(status.attacks_blocked, 1);
        assert_eq!(status.defenses_registered, 1);
        assert!((status.protection_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(status.recent_attempts.len(), 2);
        assert!(!status.recent_attempts[0].blocked);
        assert!(status.recent_attempts[1].blocked);
    }

    #[tokio::test]
    async fn test_vulnerable_echo_passes_benign_input() {
        let handler = VulnerableEcho::new();
        let value = handler
            .transform(&task("input", "hello world"))
            .await
            .unwrap_or_default();
        assert_eq!(value["result"], json!("hello world"));
        assert!(handler.security_status().recent_attempts.is_empty());

        let reversed = handler
            .transform(&task("input", "hello").with("action", "reverse"))
            .await
            .unwrap_or_default();
        assert_eq!(reversed["result"], json!("olleh"));
    }

    #[tokio::test]
    async fn test_flaky_gateway_rate_limits_per_client() {
        let handler = FlakyGateway::new(FaultInjector::disabled()).with_rate_limit(2, 60);
        let request = task("client", "alice");
        assert!(handler.transform(&request).await.is_ok());
        assert!(handler.transform(&request).await.is_ok());
        let err = handler.transform(&request).await.err();
        match err {
            Some(TaskFault::Transient(msg)) => assert!(msg.contains("alice")),
            other => panic!("expected Transient, got {other:?}"),
        }
        // A different client has its own window.
        assert!(handler.transform(&task("client", "bob")).await.is_ok());
    }

    #[tokio::test]
    async fn test_flaky_gateway_injected_failures_are_deterministic() {
        let a = FlakyGateway::new(FaultInjector::seeded(42, 0.5));
        let b = FlakyGateway::new(FaultInjector::seeded(42, 0.5));
        let request = TaskRequest::new();
        for _ in 0..20 {
            let ra = a.transform(&request).await.is_ok();
            let rb = b.transform(&request).await.is_ok();
            assert_eq!(ra, rb);
        }
    }

    #[test]
    fn test_injector_extremes() {
        let always = FaultInjector::seeded(1, 1.0);
        assert!((0..50).all(|_| always.should_fail()));
        let never = FaultInjector::disabled();
        assert!((0..50).all(|_| !never.should_fail()));
    }
}
