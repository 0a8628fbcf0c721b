//! In-memory filesystem with an invertible copy action
//!
//! Illustrates an action whose effect can be reversed exactly: each copy
//! remembers what was at the destination before it, and `invert` restores
//! it.

use crate::action::{Action, Reversibility};
use crate::error::{ForesightError, Result};
use crate::outcome::Outcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Shared path -> contents map
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    files: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemFs {
    /// Create an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem with initial files
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let files: BTreeMap<String, String> = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        Self {
            files: Arc::new(RwLock::new(files)),
        }
    }

    /// Read a file
    pub async fn read(&self, path: &str) -> Option<String> {
        self.files.read().await.get(path).cloned()
    }

    /// Write a file, returning the previous contents
    pub async fn write(&self, path: impl Into<String>, contents: impl Into<String>) -> Option<String> {
        self.files.write().await.insert(path.into(), contents.into())
    }

    /// Remove a file, returning its contents
    pub async fn remove(&self, path: &str) -> Option<String> {
        self.files.write().await.remove(path)
    }

    /// Check if a file exists
    pub async fn exists(&self, path: &str) -> bool {
        self.files.read().await.contains_key(path)
    }

    /// Snapshot of all files
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.files.read().await.clone()
    }
}

/// Arguments of [`CopyAction`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyArgs {
    pub from: String,
    pub to: String,
}

/// Copies one file over another; inversion restores the destination
pub struct CopyAction {
    name: String,
    fs: MemFs,
    reversibility: Reversibility,
    fail: AtomicBool,
    undo: Mutex<Vec<(String, Option<String>)>>,
}

impl CopyAction {
    /// Create an invertible copy action over `fs`
    pub fn new(fs: MemFs) -> Self {
        Self {
            name: "copy".to_string(),
            fs,
            reversibility: Reversibility::Invertible,
            fail: AtomicBool::new(false),
            undo: Mutex::new(Vec::new()),
        }
    }

    /// Set the action name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the reversibility marker
    pub fn with_reversibility(mut self, reversibility: Reversibility) -> Self {
        self.reversibility = reversibility;
        self
    }

    /// Make subsequent copies report an error outcome without touching files
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of copies that can still be undone
    pub async fn undo_depth(&self) -> usize {
        self.undo.lock().await.len()
    }
}

#[async_trait]
impl Action for CopyAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn reversibility(&self) -> Reversibility {
        self.reversibility
    }

    async fn apply(&self, input: &Value) -> Result<Outcome> {
        let args: CopyArgs = match serde_json::from_value(input.clone()) {
            Ok(args) => args,
            Err(e) => {
                return Ok(Outcome::error()
                    .with_field("action", json!(self.name))
                    .with_field("reason", json!(format!("invalid arguments: {}", e))));
            }
        };

        let outcome_fields = |outcome: Outcome| {
            outcome
                .with_field("action", json!(self.name))
                .with_field("from", json!(args.from))
                .with_field("to", json!(args.to))
        };

        if self.fail.load(Ordering::SeqCst) {
            return Ok(outcome_fields(Outcome::error()));
        }

        let contents = self.fs.read(&args.from).await.unwrap_or_default();
        let previous = self.fs.write(args.to.clone(), contents).await;
        self.undo.lock().await.push((args.to.clone(), previous));

        tracing::debug!(from = %args.from, to = %args.to, "Copied file");
        Ok(outcome_fields(Outcome::success()))
    }

    async fn invert(&self, _input: &Value) -> Result<()> {
        if !self.reversibility.is_invertible() {
            return Err(ForesightError::NotInvertible(self.name.clone()));
        }

        let Some((path, previous)) = self.undo.lock().await.pop() else {
            return Ok(());
        };

        match previous {
            Some(contents) => {
                self.fs.write(path, contents).await;
            }
            None => {
                self.fs.remove(&path).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_and_invert_new_file() {
        let fs = MemFs::with_files([("/a.txt", "AAA")]);
        let copy = CopyAction::new(fs.clone());
        let args = json!({"from": "/a.txt", "to": "/b.txt"});

        assert!(copy.apply(&args).await.unwrap().is_success());
        assert_eq!(fs.read("/b.txt").await.as_deref(), Some("AAA"));

        copy.invert(&args).await.unwrap();
        assert!(!fs.exists("/b.txt").await);
        assert_eq!(copy.undo_depth().await, 0);
    }

    #[tokio::test]
    async fn test_invert_restores_overwritten_file() {
        let fs = MemFs::with_files([("/a.txt", "AAA"), ("/b.txt", "BBB")]);
        let copy = CopyAction::new(fs.clone());
        let args = json!({"from": "/a.txt", "to": "/b.txt"});

        copy.apply(&args).await.unwrap();
        copy.invert(&args).await.unwrap();
        assert_eq!(fs.read("/b.txt").await.as_deref(), Some("BBB"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_a_logical_failure() {
        let copy = CopyAction::new(MemFs::new());
        let outcome = copy.apply(&json!({"from": "/a.txt"})).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.get("reason").is_some());
    }

    #[tokio::test]
    async fn test_failing_copy_leaves_fs_untouched() {
        let fs = MemFs::with_files([("/a.txt", "AAA")]);
        let copy = CopyAction::new(fs.clone());
        copy.set_failing(true);

        let outcome = copy
            .apply(&json!({"from": "/a.txt", "to": "/c.txt"}))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(!fs.exists("/c.txt").await);
    }

    #[tokio::test]
    async fn test_one_shot_copy_refuses_invert() {
        let copy = CopyAction::new(MemFs::new()).with_reversibility(Reversibility::OneShot);
        assert!(matches!(
            copy.invert(&Value::Null).await,
            Err(ForesightError::NotInvertible(_))
        ));
    }
}
