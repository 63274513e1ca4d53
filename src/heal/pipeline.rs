//! The diagnose → plan → execute healing loop.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agent::MetricsSnapshot;
use crate::llm::{GenerateRequest, LlmError, TextGenerator};
use crate::{short_id, truncate_chars, unix_now, Severity};

/// Where a diagnosis or plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Parsed from a well-formed model response.
    Generated,
    /// Model answered, but not in the expected shape; raw text was used.
    Degraded,
    /// Model call failed; static fallback content was used.
    Fallback,
}

/// Root-cause analysis for one issue.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    /// What went wrong, per the model (or the fallback text).
    pub root_cause: String,
    /// How bad it is.
    pub severity: Severity,
    /// Suggested remediations, possibly empty.
    pub recommended_actions: Vec<String>,
    /// How this diagnosis was obtained.
    pub provenance: Provenance,
    /// The unparsed model response, kept when parsing degraded.
    pub raw: Option<String>,
}

impl Diagnosis {
    /// Static diagnosis used when the model is unreachable.
    pub fn fallback() -> Self {
        Self {
            root_cause: "unknown - requires investigation".to_string(),
            severity: Severity::High,
            recommended_actions: vec![
                "Restart the agent".to_string(),
                "Check logs".to_string(),
                "Verify connectivity".to_string(),
            ],
            provenance: Provenance::Fallback,
            raw: None,
        }
    }
}

/// Ordered remediation steps for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct HealingPlan {
    /// The steps, numbering stripped.
    pub steps: Vec<String>,
    /// The plan as the model wrote it.
    pub narrative: String,
    /// How this plan was obtained.
    pub provenance: Provenance,
}

impl HealingPlan {
    /// Static plan used when the model is unreachable.
    pub fn fallback() -> Self {
        let steps = vec![
            "Restart the agent".to_string(),
            "Clear cache".to_string(),
            "Verify configuration".to_string(),
        ];
        Self {
            narrative: steps.join("\n"),
            steps,
            provenance: Provenance::Fallback,
        }
    }
}

/// Outcome of walking a plan's steps.
///
/// Step execution is simulated: each step is logged and paced, not applied
/// to real infrastructure.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Whether the walk ran to completion (always true today).
    pub executed: bool,
    /// Marks the report as simulation output.
    pub simulated: bool,
    /// How many steps were walked.
    pub steps_applied: usize,
    /// Wall-clock seconds the walk took.
    pub elapsed_secs: f64,
    /// Human-readable completion note.
    pub message: String,
}

/// One complete healing attempt, as recorded in the pipeline's log.
#[derive(Debug, Clone, Serialize)]
pub struct HealingOperation {
    /// Unique id for this attempt.
    pub operation_id: String,
    /// Which pipeline instance ran it.
    pub healer_id: String,
    /// The agent being healed.
    pub target_agent: String,
    /// The fault text that triggered healing.
    pub issue: String,
    /// Phase 1 output.
    pub diagnosis: Diagnosis,
    /// Phase 2 output.
    pub plan: HealingPlan,
    /// Phase 3 output.
    pub execution: ExecutionReport,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Pipeline tuning knobs, usually deserialized from the `[healing]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// Deadline for each model call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Pacing delay between simulated plan steps, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// How many recent operations [`HealingPipeline::stats`] returns.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_step_delay_ms() -> u64 {
    100
}

fn default_recent_window() -> usize {
    5
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            step_delay_ms: default_step_delay_ms(),
            recent_window: default_recent_window(),
        }
    }
}

/// Preventive recommendation for an agent trending toward unhealthy.
#[derive(Debug, Clone, Serialize)]
pub struct PreventiveAdvice {
    /// The agent concerned.
    pub agent_id: String,
    /// What to do about it.
    pub recommendation: String,
    /// Urgency, derived from the error count.
    pub priority: Severity,
    /// Whether the recommendation is fallback content.
    pub fallback: bool,
}

/// Aggregate view of a pipeline's history.
#[derive(Debug, Clone, Serialize)]
pub struct HealingStats {
    /// Healing attempts recorded.
    pub total_operations: usize,
    /// Attempts whose plan walk completed.
    pub executed: usize,
    /// Model calls that degraded to static fallback content.
    pub fallbacks: u64,
    /// The most recent operations, oldest first.
    pub recent: Vec<HealingOperation>,
}

/// Drives the diagnose → plan → execute loop against a text generator.
///
/// Every phase is infallible from the caller's point of view: model
/// failures and timeouts degrade to fallback content and are counted, never
/// propagated. One pipeline instance serves a whole fleet; operations are
/// logged internally.
pub struct HealingPipeline {
    healer_id: String,
    generator: Arc<dyn TextGenerator>,
    config: HealingConfig,
    operations: Mutex<Vec<HealingOperation>>,
    fallback_count: AtomicU64,
}

impl HealingPipeline {
    /// New pipeline with default configuration.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            healer_id: short_id("healer"),
            generator,
            config: HealingConfig::default(),
            operations: Mutex::new(Vec::new()),
            fallback_count: AtomicU64::new(0),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: HealingConfig) -> Self {
        self.config = config;
        self
    }

    /// This pipeline's id, stamped on every operation.
    pub fn healer_id(&self) -> &str {
        &self.healer_id
    }

    /// Model call with the configured deadline applied.
    async fn call(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let deadline = Duration::from_secs(self.config.call_timeout_secs);
        match tokio::time::timeout(deadline, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                secs: self.config.call_timeout_secs,
            }),
        }
    }

    fn note_fallback(&self, phase: &str, error: &LlmError) {
        self.fallback_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            healer = %self.healer_id,
            phase,
            error = %error,
            "model call failed, using fallback content"
        );
    }

    /// Phase 1: root-cause the issue.
    pub async fn diagnose(&self, issue: &str, snapshot: Option<&MetricsSnapshot>) -> Diagnosis {
        let metrics_json = snapshot
            .and_then(|s| serde_json::to_string(s).ok())
            .unwrap_or_else(|| "{}".to_string());
        let prompt = format!(
            "DIAGNOSE SYSTEM ISSUE\n\nIssue: {issue}\nAgent metrics: {metrics_json}\n\n\
             Provide:\n1. Root cause analysis\n2. Severity level (LOW, MEDIUM, HIGH, CRITICAL)\n\
             3. Recommended actions\n\n\
             Return as JSON with keys: root_cause, severity, recommended_actions."
        );
        let request = GenerateRequest::new(prompt)
            .with_system("You are an expert system diagnostician.")
            .with_max_tokens(300);

        match self.call(&request).await {
            Ok(response) => parse_diagnosis(&response),
            Err(e) => {
                self.note_fallback("diagnose", &e);
                Diagnosis::fallback()
            }
        }
    }

    /// Phase 2: turn a diagnosis into ordered steps.
    pub async fn plan(&self, target_agent: &str, diagnosis: &Diagnosis) -> HealingPlan {
        let diagnosis_json =
            serde_json::to_string(diagnosis).unwrap_or_else(|_| "{}".to_string());
        let prompt = format!(
            "CREATE HEALING PLAN\n\nFor agent: {target_agent}\nDiagnosis: {diagnosis_json}\n\n\
             Create a step-by-step healing plan. Number each step."
        );
        let request = GenerateRequest::new(prompt)
            .with_system("You are a senior SRE creating healing procedures.")
            .with_max_tokens(400);

        match self.call(&request).await {
            Ok(response) => {
                let steps = parse_plan_steps(&response);
                if steps.is_empty() {
                    return HealingPlan::fallback();
                }
                HealingPlan {
                    steps,
                    narrative: response,
                    provenance: Provenance::Generated,
                }
            }
            Err(e) => {
                self.note_fallback("plan", &e);
                HealingPlan::fallback()
            }
        }
    }

    /// Phase 3: walk the plan's steps, logging and pacing each one.
    pub async fn execute_plan(&self, target_agent: &str, plan: &HealingPlan) -> ExecutionReport {
        let start = Instant::now();
        for (index, step) in plan.steps.iter().enumerate() {
            tracing::info!(
                healer = %self.healer_id,
                target = %target_agent,
                step = index + 1,
                detail = %step,
                "applying healing step"
            );
            tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms)).await;
        }
        ExecutionReport {
            executed: true,
            simulated: true,
            steps_applied: plan.steps.len(),
            elapsed_secs: start.elapsed().as_secs_f64(),
            message: format!("simulated remediation of {target_agent} completed"),
        }
    }

    /// Run all three phases for one faulted agent and record the operation.
    pub async fn heal_agent(
        &self,
        target_agent: &str,
        issue: &str,
        snapshot: Option<&MetricsSnapshot>,
    ) -> HealingOperation {
        let span = tracing::info_span!(
            "heal.operation",
            healer = %self.healer_id,
            target = %target_agent,
            severity = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        let _enter = span.enter();
        let start = Instant::now();

        tracing::info!(issue = %issue, "healing started");
        let diagnosis = self.diagnose(issue, snapshot).await;
        let plan = self.plan(target_agent, &diagnosis).await;
        let execution = self.execute_plan(target_agent, &plan).await;

        let operation = HealingOperation {
            operation_id: short_id("heal"),
            healer_id: self.healer_id.clone(),
            target_agent: target_agent.to_string(),
            issue: issue.to_string(),
            diagnosis,
            plan,
            execution,
            timestamp: unix_now(),
        };
        self.operations.lock().push(operation.clone());
        span.record("severity", operation.diagnosis.severity.as_str());
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        tracing::info!(
            operation = %operation.operation_id,
            steps = operation.execution.steps_applied,
            "healing finished"
        );
        operation
    }

    /// One recommendation per agent trending toward unhealthy (more than 2
    /// accumulated errors). Healthy agents are skipped entirely.
    pub async fn preventive_check(&self, snapshots: &[MetricsSnapshot]) -> Vec<PreventiveAdvice> {
        let mut advice = Vec::new();
        for snapshot in snapshots.iter().filter(|s| s.error_count > 2) {
            let priority = if snapshot.error_count > 3 {
                Severity::Medium
            } else {
                Severity::Low
            };
            let metrics_json =
                serde_json::to_string(snapshot).unwrap_or_else(|_| "{}".to_string());
            let prompt = format!(
                "PREVENTIVE MAINTENANCE CHECK\n\nAgent metrics: {metrics_json}\n\n\
                 Suggest one concrete preventive action for this agent. \
                 Reply with a single sentence."
            );
            let request = GenerateRequest::new(prompt)
                .with_system("You are a reliability engineer reviewing agent health.")
                .with_max_tokens(120);

            match self.call(&request).await {
                Ok(response) => advice.push(PreventiveAdvice {
                    agent_id: snapshot.agent_id.clone(),
                    recommendation: response.trim().to_string(),
                    priority,
                    fallback: false,
                }),
                Err(e) => {
                    self.note_fallback("preventive", &e);
                    advice.push(PreventiveAdvice {
                        agent_id: snapshot.agent_id.clone(),
                        recommendation: "Monitor closely and implement circuit breaker"
                            .to_string(),
                        priority,
                        fallback: true,
                    });
                }
            }
        }
        advice
    }

    /// Aggregate view of this pipeline's history.
    pub fn stats(&self) -> HealingStats {
        let operations = self.operations.lock();
        let recent: Vec<HealingOperation> = operations
            .iter()
            .rev()
            .take(self.config.recent_window)
            .rev()
            .cloned()
            .collect();
        HealingStats {
            total_operations: operations.len(),
            executed: operations.iter().filter(|op| op.execution.executed).count(),
            fallbacks: self.fallback_count.load(Ordering::Relaxed),
            recent,
        }
    }

    /// Full copy of the operation log, oldest first.
    pub fn operations(&self) -> Vec<HealingOperation> {
        self.operations.lock().clone()
    }

    /// The `n` most recent operations, oldest of those first.
    pub fn recent(&self, n: usize) -> Vec<HealingOperation> {
        let operations = self.operations.lock();
        operations.iter().rev().take(n).rev().cloned().collect()
    }
}

fn parse_diagnosis(response: &str) -> Diagnosis {
    let cleaned = super::strip_code_fences(response);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) if value.is_object() => {
            let root_cause = value
                .get("root_cause")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string();
            let severity = value
                .get("severity")
                .and_then(Value::as_str)
                .and_then(Severity::parse)
                .unwrap_or(Severity::Medium);
            let recommended_actions = value
                .get("recommended_actions")
                .and_then(Value::as_array)
                .map(|actions| {
                    actions
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Diagnosis {
                root_cause,
                severity,
                recommended_actions,
                provenance: Provenance::Generated,
                raw: None,
            }
        }
        _ => Diagnosis {
            root_cause: truncate_chars(cleaned, 120),
            severity: Severity::Medium,
            recommended_actions: Vec::new(),
            provenance: Provenance::Degraded,
            raw: Some(response.to_string()),
        },
    }
}

fn parse_plan_steps(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || c == '.' || c == ')' || c == '-' || c == '*'
                })
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
