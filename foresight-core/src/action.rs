//! Action trait and reversibility marker
//!
//! Actions are the side-effecting capabilities the engine speculates on.
//! Each action declares up front whether its effect can be reversed, so
//! that plan windows can be computed with a plain scan.

use crate::error::{ForesightError, Result};
use crate::outcome::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Whether an action's effect can be undone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reversibility {
    /// `invert` reverses the most recent `apply` for the same input
    Invertible,

    /// The effect is permanent once applied
    OneShot,
}

impl Reversibility {
    /// Build from a plain capability flag
    pub fn from_flag(invertible: bool) -> Self {
        if invertible {
            Reversibility::Invertible
        } else {
            Reversibility::OneShot
        }
    }

    /// Check if this marks an invertible action
    pub fn is_invertible(self) -> bool {
        matches!(self, Reversibility::Invertible)
    }
}

/// Core action trait
///
/// `apply` reports logical failure through the returned [`Outcome`]. An
/// `Err` from `apply` is an infrastructure failure and is never treated as
/// a misprediction or rolled back by the engine.
#[async_trait]
pub trait Action: Send + Sync {
    /// Stable identifier used in results and logs
    fn name(&self) -> &str;

    /// Reversibility marker, fixed for the action's lifetime
    fn reversibility(&self) -> Reversibility;

    /// Convenience check on the reversibility marker
    fn is_invertible(&self) -> bool {
        self.reversibility().is_invertible()
    }

    /// Perform the effect
    async fn apply(&self, input: &Value) -> Result<Outcome>;

    /// Reverse the most recent `apply` made with `input`
    ///
    /// One-shot actions must not be asked to invert; the default
    /// implementation reports that as a policy violation.
    async fn invert(&self, _input: &Value) -> Result<()> {
        Err(ForesightError::NotInvertible(self.name().to_string()))
    }
}

/// Type alias for shared actions
pub type BoxedAction = Arc<dyn Action>;
