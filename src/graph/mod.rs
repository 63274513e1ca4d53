//! # Orchestration graph
//!
//! Minimal three-stage flow over a fleet:
//!
//! ```text
//!        ┌──────────┐  any errors?  ┌──────┐
//!   ───► │ Dispatch │ ────────────► │ Heal │ ───► Done
//!        └──────────┘      no       └──────┘
//!              └────────────────────────────────► Done
//! ```
//!
//! Dispatch fans one task out to every agent concurrently; Heal runs the
//! healing pipeline once per failed agent; Done closes the run. There are
//! no retries: a run reports what happened, it does not re-execute.
//! Agent error state also survives the run untouched, so repeated runs
//! against a crashing handler degrade the agent exactly as live traffic
//! would.

use serde::Serialize;
use std::collections::HashMap;

use crate::agent::{Agent, ExecutionResult};
use crate::heal::{HealingOperation, HealingPipeline};
use crate::TaskRequest;

/// The stages a run can pass through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphStage {
    /// Fan the task out to every agent.
    Dispatch,
    /// Heal the agents that failed; skipped when none did.
    Heal,
    /// Terminal.
    Done,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Successful executions, by agent id.
    pub results: HashMap<String, ExecutionResult>,
    /// Failure texts, by agent id.
    pub errors: HashMap<String, String>,
    /// Healing operations, by failed agent id.
    pub healing: HashMap<String, HealingOperation>,
    /// The stages this run passed through.
    pub stages: Vec<GraphStage>,
}

impl RunReport {
    /// Whether every agent succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A fleet of agents wired to one healing pipeline.
pub struct HealingGraph {
    agents: Vec<Agent>,
    pipeline: HealingPipeline,
}

impl HealingGraph {
    /// Build a graph over a fleet and a pipeline.
    pub fn new(agents: Vec<Agent>, pipeline: HealingPipeline) -> Self {
        Self { agents, pipeline }
    }

    /// The fleet, in dispatch order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// The shared healing pipeline.
    pub fn pipeline(&self) -> &HealingPipeline {
        &self.pipeline
    }

    /// Run one task through dispatch → (heal) → done.
    pub async fn run(&self, task: &TaskRequest) -> RunReport {
        let span = tracing::info_span!(
            "graph.run",
            agents = self.agents.len(),
            task = %task.summary(),
            failed = tracing::field::Empty,
        );
        let _enter = span.enter();

        let mut stages = vec![GraphStage::Dispatch];
        tracing::info!(agents = self.agents.len(), "dispatch stage started");

        let outcomes =
            futures::future::join_all(self.agents.iter().map(|agent| agent.execute(task))).await;

        let mut results = HashMap::new();
        let mut errors = HashMap::new();
        for outcome in outcomes {
            if outcome.success {
                results.insert(outcome.agent_id.clone(), outcome);
            } else {
                errors.insert(
                    outcome.agent_id.clone(),
                    outcome.error.clone().unwrap_or_default(),
                );
            }
        }

        let mut healing = HashMap::new();
        if !errors.is_empty() {
            stages.push(GraphStage::Heal);
            tracing::info!(failed = errors.len(), "heal stage started");
            // Walk the fleet in dispatch order so healing order is stable.
            for agent in &self.agents {
                if let Some(error) = errors.get(agent.id()) {
                    let snapshot = agent.snapshot();
                    let operation = self
                        .pipeline
                        .heal_agent(agent.id(), error, Some(&snapshot))
                        .await;
                    healing.insert(agent.id().to_string(), operation);
                }
            }
        }

        stages.push(GraphStage::Done);
        span.record("failed", errors.len());
        tracing::info!(
            succeeded = results.len(),
            failed = errors.len(),
            healed = healing.len(),
            "run complete"
        );
        RunReport {
            results,
            errors,
            healing,
            stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{EchoHandler, FailingHandler};
    use crate::llm::ScriptedGenerator;
    use std::sync::Arc;

    fn echo_agent(id: &str) -> Agent {
        Agent::with_id(id, "echo", Arc::new(EchoHandler))
    }

    fn failing_agent(id: &str) -> Agent {
        Agent::with_id(id, "failing", Arc::new(FailingHandler::default()))
    }

    fn graph(agents: Vec<Agent>) -> HealingGraph {
        HealingGraph::new(agents, HealingPipeline::new(Arc::new(ScriptedGenerator::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_success_skips_heal_stage() {
        let graph = graph(vec![echo_agent("e1"), echo_agent("e2")]);
        let report = graph.run(&TaskRequest::new().with("data", "hi")).await;

        assert_eq!(report.stages, vec![GraphStage::Dispatch, GraphStage::Done]);
        assert_eq!(report.results.len(), 2);
        assert!(report.errors.is_empty());
        assert!(report.healing.is_empty());
        assert!(report.all_succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_trigger_heal_stage() {
        let graph = graph(vec![
            echo_agent("e1"),
            failing_agent("f1"),
            failing_agent("f2"),
        ]);
        let report = graph.run(&TaskRequest::new()).await;

        assert_eq!(
            report.stages,
            vec![GraphStage::Dispatch, GraphStage::Heal, GraphStage::Done]
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.healing.len(), 2);
        assert!(report.healing.contains_key("f1"));
        assert!(report.healing.contains_key("f2"));

        let operation = &report.healing["f1"];
        assert_eq!(operation.target_agent, "f1");
        assert_eq!(operation.issue, "simulated downstream failure");
        assert!(operation.execution.executed);

        // Operations land in the shared pipeline log.
        assert_eq!(graph.pipeline().stats().total_operations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_do_not_reset_agent_error_state() {
        let graph = graph(vec![failing_agent("f1")]);
        for _ in 0..4 {
            let _ = graph.run(&TaskRequest::new()).await;
        }
        // Four failed runs accumulated four errors; healing operations
        // do not touch the agent's own counters.
        assert_eq!(graph.agents()[0].error_count(), 4);
        assert_eq!(
            graph.agents()[0].status(),
            crate::agent::AgentStatus::Degraded
        );
    }
}
