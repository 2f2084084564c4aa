use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Utterance {
    Affirm,
    Help,
    Unknown,
}

impl Utterance {
    /// Word-level keyword match on a recognizer transcript. "yes" wins over
    /// "help"/"no" when both are present.
    pub fn from_transcript(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.contains(&"yes") {
            Utterance::Affirm
        } else if words.iter().any(|w| *w == "help" || *w == "no") {
            Utterance::Help
        } else {
            Utterance::Unknown
        }
    }

    pub fn is_conclusive(self) -> bool {
        !matches!(self, Utterance::Unknown)
    }
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("speech recognition is not available on this device")]
    Unavailable,
    #[error("recognizer failed: {0}")]
    Failed(String),
}

/// External speech front end. One call is one listening window; it may yield
/// zero or more verdicts. Only the first conclusive one is acted on.
#[async_trait]
pub trait UtteranceClassifier: Send + Sync {
    async fn listen(&self, timeout_hint: Duration) -> Result<Vec<Utterance>, RecognitionError>;
}

/// Hears nothing: waits out the window and reports no verdicts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentClassifier;

#[async_trait]
impl UtteranceClassifier for SilentClassifier {
    async fn listen(&self, timeout_hint: Duration) -> Result<Vec<Utterance>, RecognitionError> {
        tokio::time::sleep(timeout_hint).await;
        Ok(Vec::new())
    }
}

/// One pre-recorded listening window.
#[derive(Debug)]
pub struct ScriptedListen {
    pub delay: Duration,
    pub result: Result<Vec<Utterance>, RecognitionError>,
}

/// Replays listening windows in order; once exhausted it behaves like
/// [`SilentClassifier`]. Counts every call.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<ScriptedListen>>,
    calls: Mutex<usize>,
}

impl ScriptedClassifier {
    pub fn new(script: impl IntoIterator<Item = ScriptedListen>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl UtteranceClassifier for ScriptedClassifier {
    async fn listen(&self, timeout_hint: Duration) -> Result<Vec<Utterance>, RecognitionError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        let next = self.script.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(window) => {
                tokio::time::sleep(window.delay).await;
                window.result
            }
            None => {
                tokio::time::sleep(timeout_hint).await;
                Ok(Vec::new())
            }
        }
    }
}
