//! Prompt lifecycle for one wearer: NONE → PHYSICAL → VOICE → NONE.
//!
//! The machine is synchronous and owns no timers. Callers feed it readings,
//! responses and countdown ticks, and carry out the [`Effect`]s it returns in
//! order. All time comes in as arguments, so it can be driven in simulated
//! time.

use crate::stage::{
    CountdownEpoch, EscalationSession, PhysicalResponse, PromptStage, COUNTDOWN_SECONDS,
    RELISTEN_EVERY_SECONDS,
};
use crate::utterance::Utterance;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use vitals_core::{classify, Config, Location, Severity, VitalSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    ConfirmedSafe(PromptStage),
    HelpRequested(PromptStage),
    VoiceTimeout,
}

impl Resolution {
    pub fn label(self) -> &'static str {
        match self {
            Resolution::ConfirmedSafe(PromptStage::Voice) => "voice_safe",
            Resolution::ConfirmedSafe(_) => "physical_safe",
            Resolution::HelpRequested(PromptStage::Voice) => "voice_help",
            Resolution::HelpRequested(_) => "physical_help",
            Resolution::VoiceTimeout => "voice_timeout",
        }
    }

    pub fn dispatches_emergency(self) -> bool {
        !matches!(self, Resolution::ConfirmedSafe(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SessionStarted { heart_rate: u32 },
    /// Replace any running countdown with a fresh one of `seconds` ticks.
    StartCountdown { epoch: CountdownEpoch, seconds: u32 },
    CancelCountdown,
    /// Replace any running listening attempt with a fresh one.
    StartListening { epoch: CountdownEpoch },
    CancelListening,
    DispatchEmergency {
        snapshot: VitalSample,
        location: Option<Location>,
    },
    Resolved(Resolution),
}

#[derive(Debug, Default)]
pub struct EscalationMachine {
    session: Option<EscalationSession>,
    issued_epochs: u64,
    last_emergency_sent_at: Option<DateTime<Utc>>,
    display_severity: Option<Severity>,
}

impl EscalationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> PromptStage {
        self.session
            .as_ref()
            .map_or(PromptStage::None, |s| s.stage)
    }

    pub fn session(&self) -> Option<&EscalationSession> {
        self.session.as_ref()
    }

    pub fn countdown(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.countdown_seconds_remaining)
    }

    /// Epoch of the live countdown, if a session is active.
    pub fn current_epoch(&self) -> Option<CountdownEpoch> {
        self.session.as_ref().map(|s| s.epoch)
    }

    pub fn last_emergency_sent_at(&self) -> Option<DateTime<Utc>> {
        self.last_emergency_sent_at
    }

    /// Severity for display; downgraded to ABNORMAL after the wearer confirms safety.
    pub fn display_severity(&self) -> Severity {
        self.display_severity.unwrap_or(Severity::Normal)
    }

    pub fn cooldown_elapsed(&self, config: &Config, now: DateTime<Utc>) -> bool {
        if config.cooldown_minutes == 0 {
            return true;
        }
        match self.last_emergency_sent_at {
            None => true,
            Some(sent) => now - sent > config.cooldown(),
        }
    }

    pub fn on_reading(
        &mut self,
        sample: VitalSample,
        location: Option<Location>,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let severity = classify(sample.heart_rate_bpm);
        self.display_severity = Some(severity);
        if severity != Severity::Critical {
            return Vec::new();
        }
        if self.session.is_some() {
            debug!(stage = %self.stage(), heart_rate = sample.heart_rate_bpm, "critical reading ignored, escalation already in flight");
            return Vec::new();
        }
        if !config.prompting_enabled {
            debug!(heart_rate = sample.heart_rate_bpm, "critical reading, prompting disabled");
            return Vec::new();
        }
        if !self.cooldown_elapsed(config, now) {
            debug!(heart_rate = sample.heart_rate_bpm, cooldown_minutes = config.cooldown_minutes, "critical reading inside cooldown");
            return Vec::new();
        }

        let heart_rate = sample.heart_rate_bpm;
        let epoch = self.next_epoch();
        self.session = Some(EscalationSession {
            stage: PromptStage::Physical,
            countdown_seconds_remaining: COUNTDOWN_SECONDS,
            started_at: now,
            snapshot: sample,
            location,
            epoch,
        });
        info!(heart_rate, "critical heart rate, prompting wearer");
        vec![
            Effect::SessionStarted { heart_rate },
            Effect::StartCountdown {
                epoch,
                seconds: COUNTDOWN_SECONDS,
            },
        ]
    }

    pub fn on_physical(&mut self, response: PhysicalResponse, now: DateTime<Utc>) -> Vec<Effect> {
        if self.stage() != PromptStage::Physical {
            debug!(?response, stage = %self.stage(), "physical response outside physical prompt ignored");
            return Vec::new();
        }
        match response {
            PhysicalResponse::Safe => self.resolve(Resolution::ConfirmedSafe(PromptStage::Physical), now),
            PhysicalResponse::Help => self.resolve(Resolution::HelpRequested(PromptStage::Physical), now),
        }
    }

    pub fn on_utterance(
        &mut self,
        epoch: CountdownEpoch,
        utterance: Utterance,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        if self.stage() != PromptStage::Voice || self.current_epoch() != Some(epoch) {
            debug!(?utterance, epoch = epoch.get(), "stale utterance dropped");
            return Vec::new();
        }
        match utterance {
            Utterance::Affirm => self.resolve(Resolution::ConfirmedSafe(PromptStage::Voice), now),
            Utterance::Help => self.resolve(Resolution::HelpRequested(PromptStage::Voice), now),
            Utterance::Unknown => Vec::new(),
        }
    }

    /// One elapsed second of the countdown identified by `epoch`.
    pub fn on_tick(&mut self, epoch: CountdownEpoch, now: DateTime<Utc>) -> Vec<Effect> {
        let Some(session) = self.session.as_mut().filter(|s| s.epoch == epoch) else {
            debug!(epoch = epoch.get(), "stale countdown tick dropped");
            return Vec::new();
        };
        session.countdown_seconds_remaining = session.countdown_seconds_remaining.saturating_sub(1);
        let remaining = session.countdown_seconds_remaining;

        match (session.stage, remaining) {
            (PromptStage::Physical, 0) => {
                let epoch = self.next_epoch();
                if let Some(session) = self.session.as_mut() {
                    session.stage = PromptStage::Voice;
                    session.countdown_seconds_remaining = COUNTDOWN_SECONDS;
                    session.epoch = epoch;
                }
                info!("no physical response, switching to voice confirmation");
                vec![
                    Effect::CancelCountdown,
                    Effect::StartCountdown {
                        epoch,
                        seconds: COUNTDOWN_SECONDS,
                    },
                    Effect::StartListening { epoch },
                ]
            }
            (PromptStage::Voice, 0) => self.resolve(Resolution::VoiceTimeout, now),
            (PromptStage::Voice, r) if r % RELISTEN_EVERY_SECONDS == 0 => {
                vec![Effect::StartListening { epoch }]
            }
            _ => Vec::new(),
        }
    }

    /// Tears down any session without dispatching. Used on shutdown.
    pub fn abort(&mut self) -> Vec<Effect> {
        match self.session.take() {
            Some(session) => {
                warn!(stage = %session.stage, "escalation aborted before resolution");
                vec![Effect::CancelCountdown, Effect::CancelListening]
            }
            None => Vec::new(),
        }
    }

    fn next_epoch(&mut self) -> CountdownEpoch {
        self.issued_epochs += 1;
        CountdownEpoch(self.issued_epochs)
    }

    fn resolve(&mut self, resolution: Resolution, now: DateTime<Utc>) -> Vec<Effect> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        let mut effects = vec![Effect::CancelCountdown, Effect::CancelListening];
        if resolution.dispatches_emergency() {
            // Monotonic even if the wall clock steps backwards.
            let sent = self.last_emergency_sent_at.map_or(now, |prev| prev.max(now));
            self.last_emergency_sent_at = Some(sent);
            warn!(heart_rate = session.snapshot.heart_rate_bpm, outcome = resolution.label(), "dispatching emergency alert");
            effects.push(Effect::DispatchEmergency {
                snapshot: session.snapshot,
                location: session.location,
            });
        } else {
            self.display_severity = Some(Severity::Abnormal);
            info!(outcome = resolution.label(), "wearer confirmed safe");
        }
        effects.push(Effect::Resolved(resolution));
        effects
    }
}
