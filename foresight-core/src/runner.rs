//! Streaming speculation
//!
//! [`ActionRunner`] starts an action in the background and, at the same
//! time, streams output produced under the assumption that the action
//! succeeds. The speculative branch stops as soon as the real outcome
//! arrives. If it agrees with the assumption, the fragments already emitted
//! stand and the stream ends. Otherwise a [`Fragment::Correction`] is
//! emitted and the output for the true outcome is streamed from the start.
//!
//! # Example
//!
//! ```rust,no_run
//! use foresight_core::prelude::*;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn demo(producer: Arc<dyn OutputProducer>, action: BoxedAction) -> Result<()> {
//! let runner = ActionRunner::default();
//! let mut stream = runner.run_speculative(producer, action, serde_json::json!({"x": 1}));
//!
//! while let Some(fragment) = stream.next().await {
//!     print!("{}", fragment?.render("<MISPREDICT>"));
//! }
//! # Ok(())
//! # }
//! ```

use crate::action::BoxedAction;
use crate::config::RunnerConfig;
use crate::error::{ForesightError, Result};
use crate::outcome::Outcome;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// At most this many corrections may occur in one speculation
pub const MAX_CORRECTIONS: usize = 1;

/// Stream of raw text fragments from an output producer
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Stream of fragments emitted by a speculative run
pub type SpeculativeStream = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// Produces output for a given action outcome
///
/// Producers must be restartable: after a misprediction they are invoked a
/// second time with the true outcome.
#[async_trait]
pub trait OutputProducer: Send + Sync {
    /// Start producing output that assumes `outcome`
    async fn produce(&self, outcome: &Outcome) -> Result<FragmentStream>;
}

/// A single item in a speculative output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Fragment {
    /// Ordinary output text
    Text(String),

    /// The assumed outcome was wrong; output restarts from the true outcome
    Correction,
}

impl Fragment {
    /// Check if this is the correction marker
    pub fn is_correction(&self) -> bool {
        matches!(self, Fragment::Correction)
    }

    /// Text content, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Fragment::Text(t) => Some(t),
            Fragment::Correction => None,
        }
    }

    /// Render as text, using `marker` for the correction sentinel
    pub fn render<'a>(&'a self, marker: &'a str) -> &'a str {
        match self {
            Fragment::Text(t) => t,
            Fragment::Correction => marker,
        }
    }
}

/// Runs actions while streaming speculative output
#[derive(Debug, Clone)]
pub struct ActionRunner {
    config: RunnerConfig,
    assumed: Outcome,
}

impl Default for ActionRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl ActionRunner {
    /// Create a runner that assumes success
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            assumed: Outcome::success(),
        }
    }

    /// Get the runner configuration
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Outcome assumed while the action is in flight
    pub fn assumed_outcome(&self) -> &Outcome {
        &self.assumed
    }

    /// Apply `action` to `input` while streaming speculative output
    ///
    /// The action is spawned immediately and always runs to completion, even
    /// if the returned stream is dropped early. Infrastructure failures from
    /// the action or the producer arrive as `Err` items after any fragments
    /// already emitted.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_speculative(
        &self,
        producer: Arc<dyn OutputProducer>,
        action: BoxedAction,
        input: Value,
    ) -> SpeculativeStream {
        let capacity = self.config.channel_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        let speculation = Speculation {
            run_id: Uuid::new_v4(),
            action: action.name().to_string(),
            assumed: self.assumed.clone(),
            producer,
            tx,
            capacity,
        };

        tracing::debug!(
            run_id = %speculation.run_id,
            action = %speculation.action,
            "Starting speculative run"
        );

        // Detached: dropping the handle never cancels the action
        let action_task = tokio::spawn(async move { action.apply(&input).await });
        tokio::spawn(speculation.drive(action_task));

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Per-invocation state of one speculative run
struct Speculation {
    run_id: Uuid,
    action: String,
    assumed: Outcome,
    producer: Arc<dyn OutputProducer>,
    tx: mpsc::Sender<Result<Fragment>>,
    capacity: usize,
}

impl Speculation {
    async fn drive(self, mut action_task: JoinHandle<Result<Outcome>>) {
        let cancel = CancellationToken::new();
        let (fragment_tx, mut fragment_rx) = mpsc::channel(self.capacity);
        let producer_task = tokio::spawn(forward_branch(
            self.producer.clone(),
            self.assumed.clone(),
            fragment_tx,
            cancel.clone(),
        ));

        let mut exhausted = false;

        // Action first: no assumed fragment is forwarded after it completes
        let outcome = loop {
            tokio::select! {
                biased;

                joined = &mut action_task => break self.settle(joined),

                item = fragment_rx.recv(), if !exhausted => match item {
                    Some(Ok(text)) => {
                        if self.tx.send(Ok(Fragment::Text(text))).await.is_err() {
                            tracing::debug!(run_id = %self.run_id, "Consumer dropped speculative stream");
                            cancel.cancel();
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        cancel.cancel();
                        let _ = self.tx.send(Err(e)).await;
                        return;
                    }
                    None => exhausted = true,
                },
            }
        };

        // The action has resolved: whatever the assumed branch still holds is dropped
        cancel.cancel();
        drop(fragment_rx);
        let _ = producer_task.await;

        match outcome {
            Ok(outcome) if outcome.matches(&self.assumed) => {
                tracing::debug!(
                    run_id = %self.run_id,
                    action = %self.action,
                    "Speculation confirmed"
                );
            }
            Ok(outcome) => self.correct(outcome).await,
            Err(e) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    action = %self.action,
                    error = %e,
                    "Action failed during speculation"
                );
                let _ = self.tx.send(Err(e)).await;
            }
        }
    }

    fn settle(&self, joined: std::result::Result<Result<Outcome>, JoinError>) -> Result<Outcome> {
        joined.unwrap_or_else(|e| {
            Err(ForesightError::ActionAborted {
                action: self.action.clone(),
                message: e.to_string(),
            })
        })
    }

    async fn correct(&self, outcome: Outcome) {
        tracing::info!(
            run_id = %self.run_id,
            action = %self.action,
            assumed = %self.assumed.status,
            actual = %outcome.status,
            "Misprediction, restarting output"
        );

        if self.tx.send(Ok(Fragment::Correction)).await.is_err() {
            return;
        }

        let mut stream = match self.producer.produce(&outcome).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = self.tx.send(Err(e)).await;
                return;
            }
        };

        while let Some(item) = stream.next().await {
            let failed = item.is_err();
            if self.tx.send(item.map(Fragment::Text)).await.is_err() || failed {
                return;
            }
        }
    }
}

/// Forward one producer branch into `tx` until it ends or is cancelled
async fn forward_branch(
    producer: Arc<dyn OutputProducer>,
    outcome: Outcome,
    tx: mpsc::Sender<Result<String>>,
    cancel: CancellationToken,
) {
    let mut stream = tokio::select! {
        _ = cancel.cancelled() => return,
        produced = producer.produce(&outcome) => match produced {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        },
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Speculative branch cancelled");
                return;
            }
            item = stream.next() => match item {
                Some(item) => {
                    let failed = item.is_err();
                    if tx.send(item).await.is_err() || failed {
                        return;
                    }
                }
                None => return,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{StubAction, TemplateProducer};
    use crate::transcript::Transcript;
    use std::time::Duration;

    const TEMPLATE: &str = "answer to x == 1: {result}";

    fn expected(outcome: &Outcome) -> String {
        TEMPLATE.replace("{result}", &outcome.to_value().to_string())
    }

    #[test]
    fn test_fragment_render() {
        assert_eq!(Fragment::Text("hi".into()).render("<M>"), "hi");
        assert_eq!(Fragment::Correction.render("<M>"), "<M>");
        assert!(Fragment::Correction.is_correction());
        assert_eq!(Fragment::Correction.text(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_speculation_has_no_marker() {
        let action = Arc::new(StubAction::new("slow").with_delay(Duration::from_millis(100)));
        let producer = Arc::new(TemplateProducer::new(TEMPLATE));

        let stream = ActionRunner::default().run_speculative(producer, action.clone(), Value::Null);
        let transcript = Transcript::collect(stream).await.unwrap();

        assert!(!transcript.was_corrected());
        assert_eq!(transcript.speculated, expected(&Outcome::success()));
        assert_eq!(action.apply_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_misprediction_restarts_from_true_outcome() {
        let action = Arc::new(
            StubAction::new("slow")
                .with_delay(Duration::from_millis(100))
                .failing(),
        );
        let producer = Arc::new(TemplateProducer::new(TEMPLATE));

        let stream = ActionRunner::default().run_speculative(producer, action.clone(), Value::Null);
        let transcript = Transcript::collect(stream).await.unwrap();

        let error_outcome = action.outcome_for(&Value::Null);
        assert!(transcript.was_corrected());
        assert!(expected(&Outcome::success()).starts_with(&transcript.speculated));
        assert_eq!(transcript.corrected.as_deref(), Some(expected(&error_outcome).as_str()));
        assert_eq!(action.apply_count(), 1);
    }
}
