//! # Agents
//!
//! An [`Agent`] pairs a pluggable [`TaskHandler`] with health bookkeeping:
//! request counters, a rolling average response time, a bounded error
//! history, and a status derived from the accumulated error count. Handlers
//! do the domain work (and fail in domain-specific ways); the agent turns
//! those failures into the uniform [`ExecutionResult`] shape the graph and
//! healing layers consume.
//!
//! Built-in handlers cover the fault families the healing subsystem is
//! exercised against: [`BuggyProcessor`] (crash-class bugs),
//! [`VulnerableEcho`] (injection-class attacks), and [`FlakyGateway`]
//! (transient faults and rate limiting).

mod executor;
mod handler;

pub use executor::{
    Agent, AgentMetrics, AgentStatus, ErrorRecord, ExecutionResult, HealingRecord,
    MetricsSnapshot,
};
pub use handler::{
    AttackAttempt, BuggyProcessor, EchoHandler, FailingHandler, FaultInjector, FlakyGateway,
    RegisteredRemedy, SecurityStatus, TaskFault, TaskHandler, VulnerableEcho,
};
