//! Human-confirmation escalation for critical heart-rate readings.

pub mod machine;
pub mod runtime;
pub mod stage;
pub mod utterance;

pub use machine::{Effect, EscalationMachine, Resolution};
pub use runtime::{
    prioritize, EscalationCommand, EscalationError, EscalationHandle, EscalationOptions,
    EscalationRuntime, EscalationView, MIN_TICK_PERIOD,
};
pub use stage::{
    CountdownEpoch, EscalationSession, PhysicalResponse, PromptStage, COUNTDOWN_SECONDS,
    RELISTEN_EVERY_SECONDS,
};
pub use utterance::{
    RecognitionError, ScriptedClassifier, ScriptedListen, SilentClassifier, Utterance,
    UtteranceClassifier,
};
