//! Plan speculation with compensating rollback
//!
//! [`PlanExecutor::run_plan`] applies plan steps eagerly, in order, up to the
//! plan's [`SpeculationWindow`]. When a step reports a non-success outcome,
//! every invertible step already applied in this run is inverted, most
//! recent first, and the run stops.
//!
//! Rollback is best-effort: a failing `invert` is logged and recorded, never
//! propagated, and never stops the remaining compensations.

use crate::action::BoxedAction;
use crate::config::PlanConfig;
use crate::error::Result;
use crate::outcome::Outcome;
use crate::plan::{Plan, SpeculationWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle of an executed plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Applied, run still in progress
    Applied,
    /// Run finished without failure; effect stands
    Committed,
    /// The step's own outcome was not success
    Failed,
    /// Inversion in progress
    Compensating,
    /// Inversion attempted (successfully or not)
    Compensated,
}

/// Result of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the plan
    pub index: usize,
    /// Action name
    pub name: String,
    /// Outcome returned by `apply`
    pub outcome: Outcome,
    /// Final state of the step
    pub state: StepState,
}

/// A successful invertible application awaiting possible compensation
#[derive(Clone)]
pub struct AppliedStep {
    /// Position in the plan
    pub index: usize,
    /// Action that was applied
    pub action: BoxedAction,
    /// Input used for `apply`, replayed to `invert`
    pub input: Value,
    /// Outcome received
    pub outcome: Outcome,
}

impl std::fmt::Debug for AppliedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppliedStep")
            .field("index", &self.index)
            .field("action", &self.action.name())
            .field("input", &self.input)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Record of one compensation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    /// Position of the inverted step in the plan
    pub index: usize,
    /// Action name
    pub name: String,
    /// Swallowed error, if `invert` failed
    pub error: Option<String>,
}

impl CompensationRecord {
    /// Check if the inversion succeeded
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Report of one plan run
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    /// Run identifier used in logs
    pub run_id: Uuid,
    /// Window computed before execution
    pub window: SpeculationWindow,
    /// One entry per executed step, through the failing step inclusive
    pub results: Vec<StepResult>,
    /// Index of the failing step, if any
    pub failure_index: Option<usize>,
    /// Compensations performed, in the order they ran
    pub compensations: Vec<CompensationRecord>,
    /// Invertible steps left applied after a successful run
    #[serde(skip)]
    pub committed: Vec<AppliedStep>,
}

impl PlanReport {
    /// Check if the run finished without a failing step
    pub fn is_success(&self) -> bool {
        self.failure_index.is_none()
    }

    /// `(name, outcome)` pairs in execution order
    pub fn pairs(&self) -> Vec<(&str, &Outcome)> {
        self.results
            .iter()
            .map(|r| (r.name.as_str(), &r.outcome))
            .collect()
    }

    /// Names of executed steps in order
    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.name.as_str()).collect()
    }

    /// Number of steps that were applied
    pub fn executed(&self) -> usize {
        self.results.len()
    }
}

/// Executes plans speculatively
///
/// The executor holds configuration only. Each `run_plan` call owns its own
/// history, so a single executor may serve concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct PlanExecutor {
    config: PlanConfig,
}

impl PlanExecutor {
    /// Create an executor with the given configuration
    pub fn new(config: PlanConfig) -> Self {
        Self { config }
    }

    /// Get the executor configuration
    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    /// Window this executor would use for `plan`
    pub fn window_for(&self, plan: &Plan) -> SpeculationWindow {
        plan.window().with_limit(self.config.max_window)
    }

    /// Run a plan
    ///
    /// A non-success outcome is reported through
    /// [`PlanReport::failure_index`]. An `Err` from an action's `apply` is an
    /// infrastructure failure and is returned as-is, without compensation.
    pub async fn run_plan(&self, plan: &Plan) -> Result<PlanReport> {
        let context = RunContext::new(self.window_for(plan));

        tracing::debug!(
            run_id = %context.run_id,
            steps = plan.len(),
            window = context.window.size(),
            capped = context.window.is_capped(),
            "Starting plan run"
        );

        context.execute(plan, &self.config).await
    }
}

/// State owned by a single plan run
struct RunContext {
    run_id: Uuid,
    window: SpeculationWindow,
    history: Vec<AppliedStep>,
    results: Vec<StepResult>,
}

impl RunContext {
    fn new(window: SpeculationWindow) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            window,
            history: Vec::new(),
            results: Vec::new(),
        }
    }

    async fn execute(mut self, plan: &Plan, config: &PlanConfig) -> Result<PlanReport> {
        for (index, step) in plan.steps().iter().enumerate() {
            let started = Instant::now();
            let outcome = step.action.apply(&step.input).await?;

            let elapsed = started.elapsed();
            if elapsed > config.slow_step_threshold {
                tracing::warn!(
                    run_id = %self.run_id,
                    step = index,
                    action = %step.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Slow action apply"
                );
            }

            let success = outcome.is_success();
            self.results.push(StepResult {
                index,
                name: step.name().to_string(),
                outcome: outcome.clone(),
                state: if success {
                    StepState::Applied
                } else {
                    StepState::Failed
                },
            });

            if !success {
                tracing::info!(
                    run_id = %self.run_id,
                    step = index,
                    action = %step.name(),
                    status = %outcome.status,
                    pending = self.history.len(),
                    "Step failed, rolling back"
                );
                let compensations = self.compensate().await;
                return Ok(self.finish(Some(index), compensations));
            }

            if step.action.is_invertible() {
                self.history.push(AppliedStep {
                    index,
                    action: step.action.clone(),
                    input: step.input.clone(),
                    outcome,
                });
            }

            if index + 1 >= self.window.size() {
                if index + 1 < plan.len() {
                    tracing::debug!(
                        run_id = %self.run_id,
                        executed = index + 1,
                        remaining = plan.len() - index - 1,
                        "Speculation window reached"
                    );
                }
                break;
            }
        }

        for result in &mut self.results {
            result.state = StepState::Committed;
        }
        Ok(self.finish(None, Vec::new()))
    }

    /// Invert every applied step, most recent first
    async fn compensate(&mut self) -> Vec<CompensationRecord> {
        let mut records = Vec::with_capacity(self.history.len());

        while let Some(step) = self.history.pop() {
            let name = step.action.name().to_string();
            self.set_state(step.index, StepState::Compensating);

            let error = match step.action.invert(&step.input).await {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(
                        run_id = %self.run_id,
                        step = step.index,
                        action = %name,
                        error = %e,
                        "Compensation failed, continuing rollback"
                    );
                    Some(e.to_string())
                }
            };

            self.set_state(step.index, StepState::Compensated);
            records.push(CompensationRecord {
                index: step.index,
                name,
                error,
            });
        }

        // Applied steps that were never in history keep their effect
        for result in &mut self.results {
            if result.state == StepState::Applied {
                result.state = StepState::Committed;
            }
        }

        records
    }

    fn set_state(&mut self, index: usize, state: StepState) {
        if let Some(result) = self.results.iter_mut().find(|r| r.index == index) {
            result.state = state;
        }
    }

    fn finish(self, failure_index: Option<usize>, compensations: Vec<CompensationRecord>) -> PlanReport {
        PlanReport {
            run_id: self.run_id,
            window: self.window,
            results: self.results,
            failure_index,
            compensations,
            committed: self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Reversibility;
    use crate::stub::{CallKind, Journal, StubAction};
    use serde_json::json;
    use std::sync::Arc;

    fn stub(name: &str, journal: &Journal) -> StubAction {
        StubAction::new(name).with_journal(journal.clone())
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let report = PlanExecutor::default().run_plan(&Plan::new()).await.unwrap();
        assert!(report.is_success());
        assert!(report.results.is_empty());
        assert!(report.committed.is_empty());
    }

    #[tokio::test]
    async fn test_all_invertible_all_success() {
        let journal = Journal::new();
        let one = Arc::new(stub("one", &journal));
        let two = Arc::new(stub("two", &journal));
        let three = Arc::new(stub("three", &journal));

        let plan = Plan::new()
            .step(one.clone(), json!({}))
            .step(two.clone(), json!({}))
            .step(three.clone(), json!({}));

        let report = PlanExecutor::default().run_plan(&plan).await.unwrap();

        assert_eq!(report.failure_index, None);
        assert_eq!(report.names(), vec!["one", "two", "three"]);
        assert_eq!(
            (one.apply_count(), two.apply_count(), three.apply_count()),
            (1, 1, 1)
        );
        assert_eq!(
            (one.invert_count(), two.invert_count(), three.invert_count()),
            (0, 0, 0)
        );
        assert_eq!(report.committed.len(), 3);
        assert!(report.results.iter().all(|r| r.state == StepState::Committed));
    }

    #[tokio::test]
    async fn test_failure_in_middle_rolls_back() {
        let journal = Journal::new();
        let a = Arc::new(stub("A", &journal));
        let b = Arc::new(stub("B", &journal).failing());
        let c = Arc::new(stub("C", &journal));

        let plan = Plan::new()
            .step(a.clone(), json!({"n": 1}))
            .step(b.clone(), json!({"n": 2}))
            .step(c.clone(), json!({"n": 3}));

        let report = PlanExecutor::default().run_plan(&plan).await.unwrap();

        assert_eq!(report.failure_index, Some(1));
        assert_eq!(report.names(), vec!["A", "B"]);
        assert!(report.results[0].outcome.is_success());
        assert!(!report.results[1].outcome.is_success());
        assert_eq!((a.invert_count(), b.invert_count()), (1, 0));
        assert_eq!(c.apply_count(), 0);
        assert_eq!(report.results[0].state, StepState::Compensated);
        assert_eq!(report.results[1].state, StepState::Failed);
        assert!(report.committed.is_empty());

        let calls = journal.entries().await;
        let last = calls.last().unwrap();
        assert_eq!(last.action, "A");
        assert_eq!(last.kind, CallKind::Invert);
        assert_eq!(last.input, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_one_shot_caps_window() {
        let journal = Journal::new();
        let a = Arc::new(stub("A", &journal));
        let b = Arc::new(stub("B", &journal).with_reversibility(Reversibility::OneShot));
        let c = Arc::new(stub("C", &journal));

        let plan = Plan::new()
            .step(a.clone(), json!({}))
            .step(b.clone(), json!({}))
            .step(c.clone(), json!({}));

        let report = PlanExecutor::default().run_plan(&plan).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.names(), vec!["A"]);
        assert_eq!(
            (a.apply_count(), b.apply_count(), c.apply_count()),
            (1, 0, 0)
        );
        assert_eq!(report.window, SpeculationWindow::Capped { steps: 1 });
        assert_eq!(report.committed.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_window_limit() {
        let journal = Journal::new();
        let actions: Vec<_> = (0..4)
            .map(|i| Arc::new(stub(&format!("s{}", i), &journal)))
            .collect();
        let plan = actions
            .iter()
            .fold(Plan::new(), |plan, a| plan.step(a.clone(), json!({})));

        let executor = PlanExecutor::new(PlanConfig {
            max_window: Some(2),
            ..Default::default()
        });
        let report = executor.run_plan(&plan).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.executed(), 2);
        assert_eq!(actions[2].apply_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_window_limit_runs_first_step_only() {
        let journal = Journal::new();
        let a = Arc::new(stub("A", &journal));
        let b = Arc::new(stub("B", &journal));
        let plan = Plan::new().step(a.clone(), json!({})).step(b.clone(), json!({}));

        let executor = PlanExecutor::new(PlanConfig {
            max_window: Some(0),
            ..Default::default()
        });
        let report = executor.run_plan(&plan).await.unwrap();

        assert_eq!(report.window, SpeculationWindow::Capped { steps: 1 });
        assert_eq!(report.executed(), 1);
        assert_eq!((a.apply_count(), b.apply_count()), (1, 0));
    }

    #[tokio::test]
    async fn test_infrastructure_failure_propagates() {
        let journal = Journal::new();
        let a = Arc::new(stub("A", &journal));
        let b = Arc::new(stub("B", &journal).raising());

        let plan = Plan::new().step(a.clone(), json!({})).step(b, json!({}));
        let result = PlanExecutor::default().run_plan(&plan).await;

        assert!(matches!(result, Err(crate::error::ForesightError::Action { .. })));
        assert_eq!(a.invert_count(), 0);
    }
}
