//! Plans and speculation windows
//!
//! A [`Plan`] is an ordered list of `(action, input)` pairs. Before a plan
//! runs, its [`SpeculationWindow`] is derived from the actions'
//! reversibility: every step may run eagerly when all of them are
//! invertible, otherwise at most one step runs.

use crate::action::{Action, BoxedAction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Window size used when any step in a plan is one-shot
pub const ONE_SHOT_WINDOW: usize = 1;

/// A single step of a plan
#[derive(Clone)]
pub struct PlanStep {
    /// Action to apply
    pub action: BoxedAction,
    /// Input passed to `apply` (and to `invert` on rollback)
    pub input: Value,
}

impl PlanStep {
    /// Create a new plan step
    pub fn new(action: BoxedAction, input: Value) -> Self {
        Self { action, input }
    }

    /// Name of the step's action
    pub fn name(&self) -> &str {
        self.action.name()
    }
}

impl std::fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanStep")
            .field("action", &self.action.name())
            .field("reversibility", &self.action.reversibility())
            .field("input", &self.input)
            .finish()
    }
}

/// Ordered sequence of plan steps
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    /// Create an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step
    pub fn step<A: Action + 'static>(self, action: Arc<A>, input: Value) -> Self {
        self.boxed_step(action, input)
    }

    /// Append a step from an already type-erased action
    pub fn boxed_step(mut self, action: BoxedAction, input: Value) -> Self {
        self.steps.push(PlanStep::new(action, input));
        self
    }

    /// Add a step in place
    pub fn push(&mut self, action: BoxedAction, input: Value) {
        self.steps.push(PlanStep::new(action, input));
    }

    /// Steps in plan order
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Get the number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the plan is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check whether every step can be reversed
    pub fn all_invertible(&self) -> bool {
        self.steps.iter().all(|s| s.action.is_invertible())
    }

    /// Derive the speculation window for this plan
    pub fn window(&self) -> SpeculationWindow {
        SpeculationWindow::for_plan(self)
    }
}

impl FromIterator<PlanStep> for Plan {
    fn from_iter<I: IntoIterator<Item = PlanStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(BoxedAction, Value)> for Plan {
    fn from_iter<I: IntoIterator<Item = (BoxedAction, Value)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(action, input)| PlanStep::new(action, input))
            .collect()
    }
}

/// Maximum number of steps eligible for eager execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpeculationWindow {
    /// Every step is invertible; the whole plan may run
    Full { steps: usize },

    /// At least one step is one-shot; execution is capped
    Capped { steps: usize },
}

impl SpeculationWindow {
    /// Compute the window for a plan
    ///
    /// Depends only on the plan's reversibility markers, never on execution.
    pub fn for_plan(plan: &Plan) -> Self {
        if plan.all_invertible() {
            SpeculationWindow::Full { steps: plan.len() }
        } else {
            SpeculationWindow::Capped {
                steps: ONE_SHOT_WINDOW,
            }
        }
    }

    /// Apply an additional configured cap
    ///
    /// A cap below one is raised to one: the first step always runs.
    pub fn with_limit(self, limit: Option<usize>) -> Self {
        match limit.map(|max| max.max(ONE_SHOT_WINDOW)) {
            Some(max) if max < self.size() => SpeculationWindow::Capped { steps: max },
            _ => self,
        }
    }

    /// Number of steps the window admits
    pub fn size(&self) -> usize {
        match self {
            SpeculationWindow::Full { steps } | SpeculationWindow::Capped { steps } => *steps,
        }
    }

    /// Check if the window was capped below the plan length
    pub fn is_capped(&self) -> bool {
        matches!(self, SpeculationWindow::Capped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Reversibility;
    use crate::stub::StubAction;
    use serde_json::json;

    fn plan_of(flags: &[bool]) -> Plan {
        flags
            .iter()
            .enumerate()
            .map(|(i, &invertible)| {
                let action: BoxedAction = Arc::new(
                    StubAction::new(format!("s{}", i))
                        .with_reversibility(Reversibility::from_flag(invertible)),
                );
                (action, json!({}))
            })
            .collect()
    }

    #[test]
    fn test_empty_plan_window() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.window(), SpeculationWindow::Full { steps: 0 });
    }

    #[test]
    fn test_all_invertible_window_is_full() {
        let plan = plan_of(&[true, true, true, true]);
        assert_eq!(plan.window().size(), 4);
        assert!(!plan.window().is_capped());
    }

    #[test]
    fn test_one_shot_anywhere_caps_window() {
        for flags in [
            vec![false, true, true],
            vec![true, false, true],
            vec![true, true, false],
            vec![false],
        ] {
            let plan = plan_of(&flags);
            assert_eq!(plan.window(), SpeculationWindow::Capped { steps: 1 });
        }
    }

    #[test]
    fn test_window_is_idempotent() {
        let plan = plan_of(&[true, false, true]);
        let first = SpeculationWindow::for_plan(&plan);
        for _ in 0..5 {
            assert_eq!(SpeculationWindow::for_plan(&plan), first);
        }
    }

    #[test]
    fn test_configured_limit() {
        let window = plan_of(&[true, true, true]).window();
        assert_eq!(window.with_limit(Some(2)), SpeculationWindow::Capped { steps: 2 });
        assert_eq!(window.with_limit(Some(10)), window);
        assert_eq!(window.with_limit(None), window);
    }

    #[test]
    fn test_zero_limit_admits_one_step() {
        let window = plan_of(&[true, true]).window();
        assert_eq!(window.with_limit(Some(0)), SpeculationWindow::Capped { steps: 1 });
        assert_eq!(Plan::new().window().with_limit(Some(0)), Plan::new().window());
    }
}
