//! Stub actions and producers for deterministic runs
//!
//! [`StubAction`] counts its calls and returns scripted outcomes, and
//! [`TemplateProducer`] streams a rendered template one character at a
//! time. Both are used by the test suite and the CLI harness.

use crate::action::{Action, Reversibility};
use crate::error::{ForesightError, Result};
use crate::outcome::Outcome;
use crate::runner::{FragmentStream, OutputProducer};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Kind of recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Apply,
    Invert,
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub action: String,
    pub kind: CallKind,
    pub input: Value,
}

/// Shared, ordered log of stub calls across actions
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, action: &str, kind: CallKind, input: &Value) {
        self.entries.lock().await.push(JournalEntry {
            action: action.to_string(),
            kind,
            input: input.clone(),
        });
    }

    /// Snapshot of all calls so far
    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().await.clone()
    }

    /// Names of actions inverted, in call order
    pub async fn inverted(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == CallKind::Invert)
            .map(|e| e.action.clone())
            .collect()
    }
}

/// An action with scripted behavior that counts its calls
pub struct StubAction {
    name: String,
    reversibility: Reversibility,
    delay: Duration,
    fail: AtomicBool,
    raise: AtomicBool,
    fail_invert: AtomicBool,
    applied: AtomicUsize,
    inverted: AtomicUsize,
    completed: AtomicUsize,
    journal: Option<Journal>,
}

impl StubAction {
    /// Create an invertible stub that succeeds immediately
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reversibility: Reversibility::Invertible,
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            raise: AtomicBool::new(false),
            fail_invert: AtomicBool::new(false),
            applied: AtomicUsize::new(0),
            inverted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            journal: None,
        }
    }

    /// Set the reversibility marker
    pub fn with_reversibility(mut self, reversibility: Reversibility) -> Self {
        self.reversibility = reversibility;
        self
    }

    /// Simulate a slow action
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record calls into a shared journal
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Report an error outcome from `apply`
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    /// Return `Err` from `apply` instead of an outcome
    pub fn raising(self) -> Self {
        self.raise.store(true, Ordering::SeqCst);
        self
    }

    /// Return `Err` from `invert`
    pub fn with_failing_invert(self) -> Self {
        self.fail_invert.store(true, Ordering::SeqCst);
        self
    }

    /// Toggle error outcomes at runtime
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of `apply` calls started
    pub fn apply_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Number of `apply` calls that ran to the end
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of `invert` calls
    pub fn invert_count(&self) -> usize {
        self.inverted.load(Ordering::SeqCst)
    }

    /// Outcome `apply` currently returns for `input`
    pub fn outcome_for(&self, input: &Value) -> Outcome {
        let outcome = if self.fail.load(Ordering::SeqCst) {
            Outcome::error()
        } else {
            Outcome::success()
        };
        outcome
            .with_field("action", json!(self.name))
            .with_field("input", input.clone())
    }
}

#[async_trait]
impl Action for StubAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn reversibility(&self) -> Reversibility {
        self.reversibility
    }

    async fn apply(&self, input: &Value) -> Result<Outcome> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(journal) = &self.journal {
            journal.record(&self.name, CallKind::Apply, input).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.raise.load(Ordering::SeqCst) {
            return Err(ForesightError::action(
                &self.name,
                "simulated infrastructure failure",
            ));
        }
        Ok(self.outcome_for(input))
    }

    async fn invert(&self, input: &Value) -> Result<()> {
        if !self.reversibility.is_invertible() {
            return Err(ForesightError::NotInvertible(self.name.clone()));
        }
        self.inverted.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.record(&self.name, CallKind::Invert, input).await;
        }

        if self.fail_invert.load(Ordering::SeqCst) {
            return Err(ForesightError::invert(&self.name, "simulated invert failure"));
        }
        Ok(())
    }
}

/// Streams a template rendered with the outcome, one character per fragment
///
/// `{result}` in the template is replaced with the outcome as compact JSON.
#[derive(Debug, Clone)]
pub struct TemplateProducer {
    template: String,
    delay: Duration,
    fail_after: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl TemplateProducer {
    /// Create a producer for `template`
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            delay: Duration::ZERO,
            fail_after: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait `delay` before each fragment
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Emit an error after `count` fragments
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Full text produced for `outcome`
    pub fn render(&self, outcome: &Outcome) -> String {
        self.template
            .replace("{result}", &outcome.to_value().to_string())
    }

    /// Number of times `produce` was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputProducer for TemplateProducer {
    async fn produce(&self, outcome: &Outcome) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut items: Vec<Result<String>> =
            self.render(outcome).chars().map(|c| Ok(c.to_string())).collect();
        if let Some(count) = self.fail_after {
            items.truncate(count);
            items.push(Err(ForesightError::Producer(
                "simulated producer failure".to_string(),
            )));
        }

        let delay = self.delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_counts_and_journals() {
        let journal = Journal::new();
        let action = StubAction::new("copy").with_journal(journal.clone());

        let outcome = action.apply(&json!({"x": 1})).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.get("input"), Some(&json!({"x": 1})));

        action.invert(&json!({"x": 1})).await.unwrap();
        assert_eq!((action.apply_count(), action.invert_count()), (1, 1));
        assert_eq!(journal.inverted().await, vec!["copy".to_string()]);
    }

    #[tokio::test]
    async fn test_one_shot_stub_refuses_invert() {
        let action = StubAction::new("email").with_reversibility(Reversibility::OneShot);
        let err = action.invert(&Value::Null).await.unwrap_err();
        assert!(matches!(err, ForesightError::NotInvertible(_)));
        assert_eq!(action.invert_count(), 0);
    }

    #[tokio::test]
    async fn test_template_producer_streams_characters() {
        let producer = TemplateProducer::new("r={result}");
        let stream = producer.produce(&Outcome::error()).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments.concat(), r#"r={"status":"error"}"#);
        assert_eq!(fragments[0], "r");
        assert_eq!(producer.call_count(), 1);
    }
}
