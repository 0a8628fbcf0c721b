//! Collected output of a speculative run

use crate::error::{ForesightError, Result};
use crate::runner::{Fragment, MAX_CORRECTIONS, SpeculativeStream};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Text of a speculative run, split at the correction marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    /// Output streamed under the assumed outcome
    pub speculated: String,

    /// Output for the true outcome, present only after a misprediction
    pub corrected: Option<String>,
}

impl Transcript {
    /// Drain a speculative stream
    ///
    /// The first error item ends collection and is returned.
    pub async fn collect(mut stream: SpeculativeStream) -> Result<Self> {
        let mut transcript = Transcript::default();
        let mut corrections = 0;

        while let Some(fragment) = stream.next().await {
            match fragment? {
                Fragment::Text(text) => transcript.push_text(&text),
                Fragment::Correction => {
                    corrections += 1;
                    transcript.begin_correction(corrections)?;
                }
            }
        }

        Ok(transcript)
    }

    /// Split rendered output on `marker`
    pub fn parse(rendered: &str, marker: &str) -> Result<Self> {
        if marker.is_empty() {
            return Err(ForesightError::Configuration(
                "correction marker must not be empty".to_string(),
            ));
        }

        let mut parts = rendered.split(marker);
        let speculated = parts.next().unwrap_or_default().to_string();
        let corrected = parts.next().map(str::to_string);

        let extra = parts.count();
        if extra > 0 {
            return Err(ForesightError::CorrectionLimit {
                observed: MAX_CORRECTIONS + extra,
                limit: MAX_CORRECTIONS,
            });
        }

        Ok(Self {
            speculated,
            corrected,
        })
    }

    /// Check if a correction was emitted
    pub fn was_corrected(&self) -> bool {
        self.corrected.is_some()
    }

    /// Text the consumer should treat as the final answer
    pub fn final_text(&self) -> &str {
        self.corrected.as_deref().unwrap_or(&self.speculated)
    }

    /// Check the transcript settles on `truth`
    ///
    /// Uncorrected output must equal `truth` exactly; corrected output must
    /// restate `truth` in full after the marker.
    pub fn settles_on(&self, truth: &str) -> bool {
        self.final_text() == truth
    }

    /// Render back to a single string with `marker` as the sentinel
    pub fn render(&self, marker: &str) -> String {
        match &self.corrected {
            Some(corrected) => format!("{}{}{}", self.speculated, marker, corrected),
            None => self.speculated.clone(),
        }
    }

    fn push_text(&mut self, text: &str) {
        match self.corrected.as_mut() {
            Some(corrected) => corrected.push_str(text),
            None => self.speculated.push_str(text),
        }
    }

    fn begin_correction(&mut self, observed: usize) -> Result<()> {
        if observed > MAX_CORRECTIONS {
            return Err(ForesightError::CorrectionLimit {
                observed,
                limit: MAX_CORRECTIONS,
            });
        }
        self.corrected = Some(String::new());
        Ok(())
    }
}
