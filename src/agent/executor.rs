//! The agent wrapper: execution bookkeeping and the health state machine.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::handler::TaskHandler;
use crate::{short_id, unix_now, TaskRequest};

/// Health states an agent moves through.
///
/// Error accumulation drives healthy → degraded → failed; only
/// [`Agent::heal`] moves an agent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Operating normally.
    Healthy,
    /// Enough errors to worry about (more than 3).
    Degraded,
    /// Too many errors to trust (more than 10).
    Failed,
    /// Mid-reset; transient, never observable across an await point.
    Healing,
}

impl AgentStatus {
    /// Status implied by an accumulated error count.
    pub fn from_error_count(count: u32) -> Self {
        if count > 10 {
            Self::Failed
        } else if count > 3 {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Healing => "healing",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request counters and timing, updated on every execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentMetrics {
    /// Executions attempted.
    pub total_requests: u64,
    /// Executions that returned a value.
    pub successful_requests: u64,
    /// Rolling mean of successful execution times, in seconds.
    ///
    /// Failed executions never feed this mean, so a crash-looping agent
    /// does not poison its own latency signal.
    pub average_response_time: f64,
    /// Executions that returned a fault.
    pub total_errors: u64,
}

/// One failed execution, as kept in the agent's bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// The fault's display text.
    pub error: String,
    /// Summary of the task that failed.
    pub task: String,
    /// Unix seconds.
    pub timestamp: u64,
    /// The agent's status when the error struck (before this error's
    /// own contribution was applied).
    pub status: AgentStatus,
}

/// One heal, as kept in the agent's append-only healing history.
#[derive(Debug, Clone, Serialize)]
pub struct HealingRecord {
    /// What was done; currently always `"reset"`.
    pub action: String,
    /// Error count wiped by the reset.
    pub previous_error_count: u32,
    /// Why the heal happened (fault text, or `"preventive"`).
    pub reason: String,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Point-in-time view of an agent's health, safe to serialize into
/// diagnosis prompts and reports.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Agent id.
    pub agent_id: String,
    /// Handler family, e.g. `"buggy-processor"`.
    pub agent_type: String,
    /// Current status.
    pub status: AgentStatus,
    /// Seconds since construction.
    pub uptime_seconds: f64,
    /// Accumulated errors since the last heal.
    pub error_count: u32,
    /// Counters and timing.
    pub metrics: AgentMetrics,
    /// Whether the healing threshold (more than 3 errors) is crossed.
    pub needs_healing: bool,
    /// Unix seconds of the last execution attempt; 0 if never executed.
    pub last_active: u64,
}

/// Outcome of one [`Agent::execute`] call.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Whether the handler returned a value.
    pub success: bool,
    /// Handler output on success.
    pub result: Option<Value>,
    /// Fault text on failure.
    pub error: Option<String>,
    /// Which agent executed the task.
    pub agent_id: String,
    /// The agent's status after this execution.
    pub status: AgentStatus,
    /// The agent's error count after this execution.
    pub error_count: u32,
    /// Wall-clock execution time in seconds.
    pub response_time: f64,
    /// Unix seconds.
    pub timestamp: u64,
}

const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug)]
struct AgentState {
    status: AgentStatus,
    error_count: u32,
    metrics: AgentMetrics,
    error_history: VecDeque<ErrorRecord>,
    healing_history: Vec<HealingRecord>,
    history_limit: usize,
    last_active: u64,
}

/// A worker that executes tasks through its handler and tracks its own
/// health.
///
/// Cloning is cheap and shares state: clones observe the same counters,
/// history, and status, so a fleet can hand the same agent to the dispatch
/// path and a monitoring loop.
#[derive(Clone)]
pub struct Agent {
    id: String,
    agent_type: String,
    handler: Arc<dyn TaskHandler>,
    started: Instant,
    inner: Arc<Mutex<AgentState>>,
}

impl Agent {
    /// New agent with a generated id (`"{agent_type}-{hex}"`).
    pub fn new(agent_type: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        let agent_type = agent_type.into();
        let id = short_id(&agent_type);
        Self::with_id(id, agent_type, handler)
    }

    /// New agent with an explicit id.
    pub fn with_id(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            handler,
            started: Instant::now(),
            inner: Arc::new(Mutex::new(AgentState {
                status: AgentStatus::Healthy,
                error_count: 0,
                metrics: AgentMetrics::default(),
                error_history: VecDeque::new(),
                healing_history: Vec::new(),
                history_limit: DEFAULT_HISTORY_LIMIT,
                last_active: 0,
            })),
        }
    }

    /// Cap the error history at `limit` records (oldest evicted first).
    pub fn with_history_limit(self, limit: usize) -> Self {
        self.inner.lock().history_limit = limit.max(1);
        self
    }

    /// Agent id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handler family name.
    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Execute one task and record the outcome.
    ///
    /// Never returns an error: faults become `success == false` results so
    /// the dispatch layer can partition outcomes without unwinding. The
    /// handler runs outside the state lock; only the bookkeeping on either
    /// side takes it.
    pub async fn execute(&self, task: &TaskRequest) -> ExecutionResult {
        let start = Instant::now();
        {
            let mut state = self.inner.lock();
            state.metrics.total_requests += 1;
            state.last_active = unix_now();
        }

        let outcome = self.handler.transform(task).await;
        let elapsed = start.elapsed().as_secs_f64();

        let mut state = self.inner.lock();
        match outcome {
            Ok(value) => {
                state.metrics.successful_requests += 1;
                let n = state.metrics.successful_requests as f64;
                state.metrics.average_response_time =
                    (state.metrics.average_response_time * (n - 1.0) + elapsed) / n;
                tracing::debug!(agent = %self.id, elapsed_secs = elapsed, "task completed");
                ExecutionResult {
                    success: true,
                    result: Some(value),
                    error: None,
                    agent_id: self.id.clone(),
                    status: state.status,
                    error_count: state.error_count,
                    response_time: elapsed,
                    timestamp: unix_now(),
                }
            }
            Err(fault) => {
                let message = fault.to_string();
                let status_at_failure = state.status;
                state.error_count += 1;
                state.metrics.total_errors += 1;
                if state.error_history.len() >= state.history_limit {
                    state.error_history.pop_front();
                }
                state.error_history.push_back(ErrorRecord {
                    error: message.clone(),
                    task: task.summary(),
                    timestamp: unix_now(),
                    status: status_at_failure,
                });
                state.status = AgentStatus::from_error_count(state.error_count);
                tracing::warn!(
                    agent = %self.id,
                    error_count = state.error_count,
                    status = %state.status,
                    error = %message,
                    "task failed"
                );
                ExecutionResult {
                    success: false,
                    result: None,
                    error: Some(message),
                    agent_id: self.id.clone(),
                    status: state.status,
                    error_count: state.error_count,
                    response_time: elapsed,
                    timestamp: unix_now(),
                }
            }
        }
    }

    /// Reset the agent: wipe the error count and history, return to
    /// healthy, and record the heal.
    ///
    /// Unconditional: healing a healthy agent is a no-op reset and still
    /// recorded. `reason` defaults to `"preventive"`.
    pub fn heal(&self, reason: Option<&str>) -> HealingRecord {
        let mut state = self.inner.lock();
        state.status = AgentStatus::Healing;
        let record = HealingRecord {
            action: "reset".to_string(),
            previous_error_count: state.error_count,
            reason: reason.unwrap_or("preventive").to_string(),
            timestamp: unix_now(),
        };
        state.error_count = 0;
        state.error_history.clear();
        state.status = AgentStatus::Healthy;
        state.healing_history.push(record.clone());
        tracing::info!(
            agent = %self.id,
            previous_errors = record.previous_error_count,
            reason = %record.reason,
            "agent healed"
        );
        record
    }

    /// Point-in-time health view.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock();
        MetricsSnapshot {
            agent_id: self.id.clone(),
            agent_type: self.agent_type.clone(),
            status: state.status,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            error_count: state.error_count,
            metrics: state.metrics.clone(),
            needs_healing: state.error_count > 3,
            last_active: state.last_active,
        }
    }

    /// Current status.
    pub fn status(&self) -> AgentStatus {
        self.inner.lock().status
    }

    /// Current accumulated error count.
    pub fn error_count(&self) -> u32 {
        self.inner.lock().error_count
    }

    /// Copy of the bounded error history, oldest first.
    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.inner.lock().error_history.iter().cloned().collect()
    }

    /// Copy of the append-only healing history, oldest first.
    pub fn healing_history(&self) -> Vec<HealingRecord> {
        self.inner.lock().healing_history.clone()
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .field("status", &state.status)
            .field("error_count", &state.error_count)
            .finish()
    }
}
