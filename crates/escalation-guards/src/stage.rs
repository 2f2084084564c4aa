use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use vitals_core::{Location, VitalSample};

/// Seconds each prompt stage waits for the wearer before moving on.
pub const COUNTDOWN_SECONDS: u32 = 10;
/// While in VOICE, listening is re-issued whenever the remaining count is a multiple of this.
pub const RELISTEN_EVERY_SECONDS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptStage {
    None,
    Physical,
    Voice,
}

impl PromptStage {
    pub fn code(self) -> i64 {
        match self {
            PromptStage::None => 0,
            PromptStage::Physical => 1,
            PromptStage::Voice => 2,
        }
    }
}

impl fmt::Display for PromptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PromptStage::None => "none",
            PromptStage::Physical => "physical",
            PromptStage::Voice => "voice",
        };
        f.write_str(name)
    }
}

/// Identifies one countdown (and the listening attempts that belong to it).
/// A new value is issued on every stage entry; anything tagged with an older
/// value is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountdownEpoch(pub(crate) u64);

impl CountdownEpoch {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalResponse {
    /// "I'm safe"
    Safe,
    /// "Help"
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationSession {
    pub stage: PromptStage,
    pub countdown_seconds_remaining: u32,
    pub started_at: DateTime<Utc>,
    pub snapshot: VitalSample,
    pub location: Option<Location>,
    pub(crate) epoch: CountdownEpoch,
}

impl EscalationSession {
    pub fn epoch(&self) -> CountdownEpoch {
        self.epoch
    }
}
