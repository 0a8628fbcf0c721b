//! # Foresight - Act Optimistically, Compensate on Mismatch
//!
//! Foresight lets an agent speculate that a side-effecting action will
//! succeed and keep working while the action is still in flight:
//! - **Streaming speculation**: stream output that assumes success while the
//!   action runs; emit a correction and restart if it fails
//! - **Plan speculation**: apply a sequence of actions eagerly and invert the
//!   applied ones, newest first, when a later step fails
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use foresight_core::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let fs = MemFs::with_files([("/a.txt", "hello")]);
//!     let copy = Arc::new(CopyAction::new(fs.clone()));
//!
//!     let plan = Plan::new()
//!         .step(copy.clone(), json!({"from": "/a.txt", "to": "/b.txt"}))
//!         .step(copy, json!({"from": "/b.txt", "to": "/c.txt"}));
//!
//!     let report = PlanExecutor::default().run_plan(&plan).await?;
//!     assert!(report.is_success());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Actions** declare a static [`Reversibility`](action::Reversibility)
//!   marker; a plan containing any one-shot action runs at most one step
//! - **Rollback** is best-effort: failing inversions are logged and recorded
//!   but never stop the remaining compensations
//! - **Streams** carry a typed [`Fragment::Correction`](runner::Fragment)
//!   sentinel, emitted at most once per run

pub mod action;
pub mod config;
pub mod error;
pub mod executor;
pub mod memfs;
pub mod outcome;
pub mod plan;
pub mod runner;
pub mod stub;
pub mod transcript;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{Action, BoxedAction, Reversibility};
    pub use crate::config::{ConfigBuilder, ForesightConfig, PlanConfig, RunnerConfig};
    pub use crate::error::{ForesightError, Result};
    pub use crate::executor::{
        AppliedStep, CompensationRecord, PlanExecutor, PlanReport, StepResult, StepState,
    };
    pub use crate::memfs::{CopyAction, CopyArgs, MemFs};
    pub use crate::outcome::{Outcome, OutcomeStatus};
    pub use crate::plan::{Plan, PlanStep, SpeculationWindow};
    pub use crate::runner::{
        ActionRunner, Fragment, FragmentStream, OutputProducer, SpeculativeStream,
    };
    pub use crate::stub::{Journal, StubAction, TemplateProducer};
    pub use crate::transcript::Transcript;
}
