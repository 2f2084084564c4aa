use crate::machine::{Effect, EscalationMachine};
use crate::stage::{CountdownEpoch, PhysicalResponse, PromptStage, RELISTEN_EVERY_SECONDS};
use crate::utterance::{Utterance, UtteranceClassifier};
use chrono::{DateTime, Utc};
use prometheus_bridge::EscalationMetrics;
use std::sync::Arc;
use std::time::Duration;
use telemetry_dispatch::{DispatchContext, TelemetryDispatcher};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use vitals_core::{Config, Location, PreferenceStore, Severity, VitalSample};

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("escalation runtime has stopped")]
    Stopped,
}

/// Everything the state machine reacts to arrives through one queue.
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationCommand {
    /// `config` is the settings snapshot the sampler read for this tick;
    /// `None` keeps whatever the runtime last saw.
    Reading {
        sample: VitalSample,
        location: Option<Location>,
        config: Option<Config>,
    },
    Physical(PhysicalResponse),
    /// Free text from a console or companion app.
    Typed(String),
    Tick(CountdownEpoch),
    Heard {
        epoch: CountdownEpoch,
        utterance: Utterance,
    },
    Shutdown,
}

impl EscalationCommand {
    fn priority(&self) -> u8 {
        match self {
            EscalationCommand::Physical(_)
            | EscalationCommand::Typed(_)
            | EscalationCommand::Heard { .. } => 0,
            EscalationCommand::Reading { .. } | EscalationCommand::Tick(_) => 1,
            EscalationCommand::Shutdown => 2,
        }
    }
}

/// Orders a drained batch so wearer signals run before any countdown tick
/// queued alongside them. Stable within each priority class.
pub fn prioritize(batch: &mut [EscalationCommand]) {
    batch.sort_by_key(EscalationCommand::priority);
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationView {
    pub stage: PromptStage,
    pub countdown_seconds: Option<u32>,
    pub display_severity: Severity,
    pub last_emergency_sent_at: Option<DateTime<Utc>>,
    pub sessions_started: u64,
    pub emergencies_dispatched: u64,
    /// A countdown task is scheduled. Never true while `stage` is `None`.
    pub timer_armed: bool,
}

impl Default for EscalationView {
    fn default() -> Self {
        Self {
            stage: PromptStage::None,
            countdown_seconds: None,
            display_severity: Severity::Normal,
            last_emergency_sent_at: None,
            sessions_started: 0,
            emergencies_dispatched: 0,
            timer_armed: false,
        }
    }
}

/// Shortest countdown step the runtime accepts; zero would spin the timer.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct EscalationOptions {
    /// Length of one countdown second. Shortened in tests and demos.
    pub tick_period: Duration,
    pub queue_depth: usize,
}

impl Default for EscalationOptions {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            queue_depth: 64,
        }
    }
}

#[derive(Clone)]
pub struct EscalationHandle {
    tx: mpsc::Sender<EscalationCommand>,
    view: watch::Receiver<EscalationView>,
}

impl EscalationHandle {
    pub async fn submit_reading(
        &self,
        sample: VitalSample,
        location: Option<Location>,
    ) -> Result<(), EscalationError> {
        self.send(EscalationCommand::Reading {
            sample,
            location,
            config: None,
        })
        .await
    }

    /// Like [`submit_reading`](Self::submit_reading), but decides with `config`
    /// and keeps it for later readings.
    pub async fn submit_reading_with_config(
        &self,
        sample: VitalSample,
        location: Option<Location>,
        config: Config,
    ) -> Result<(), EscalationError> {
        self.send(EscalationCommand::Reading {
            sample,
            location,
            config: Some(config),
        })
        .await
    }

    pub async fn respond_physical(&self, response: PhysicalResponse) -> Result<(), EscalationError> {
        self.send(EscalationCommand::Physical(response)).await
    }

    pub async fn respond_text(&self, text: impl Into<String>) -> Result<(), EscalationError> {
        self.send(EscalationCommand::Typed(text.into())).await
    }

    pub async fn shutdown(&self) -> Result<(), EscalationError> {
        self.send(EscalationCommand::Shutdown).await
    }

    pub fn view(&self) -> EscalationView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EscalationView> {
        self.view.clone()
    }

    async fn send(&self, cmd: EscalationCommand) -> Result<(), EscalationError> {
        self.tx.send(cmd).await.map_err(|_| EscalationError::Stopped)
    }
}

/// Wall-clock time that advances with the tokio clock, so paused-time
/// tests see cooldowns elapse and wall-clock steps cannot reorder events.
#[derive(Debug, Clone, Copy)]
struct RuntimeClock {
    wall: DateTime<Utc>,
    base: Instant,
}

impl RuntimeClock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            base: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.base.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }
}

/// Single owner of the [`EscalationMachine`]. Runs as one tokio task; timers
/// and listening windows are child tasks that report back through the queue.
pub struct EscalationRuntime {
    machine: EscalationMachine,
    config: Config,
    dispatcher: TelemetryDispatcher,
    classifier: Arc<dyn UtteranceClassifier>,
    metrics: Option<EscalationMetrics>,
    tick_period: Duration,
    clock: RuntimeClock,
    commands: mpsc::Receiver<EscalationCommand>,
    loopback: mpsc::WeakSender<EscalationCommand>,
    view: watch::Sender<EscalationView>,
    countdown: Option<JoinHandle<()>>,
    listening: Option<JoinHandle<()>>,
    sessions_started: u64,
    emergencies_dispatched: u64,
}

impl EscalationRuntime {
    pub fn spawn(
        prefs: Arc<dyn PreferenceStore>,
        dispatcher: TelemetryDispatcher,
        classifier: Arc<dyn UtteranceClassifier>,
        metrics: Option<EscalationMetrics>,
        options: EscalationOptions,
    ) -> (EscalationHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(options.queue_depth.max(1));
        let (view_tx, view_rx) = watch::channel(EscalationView::default());
        let config = prefs.load().unwrap_or_else(|e| {
            warn!(error = %e, "could not read preferences, starting from defaults");
            Config::default()
        });
        let tick_period = if options.tick_period < MIN_TICK_PERIOD {
            warn!(
                requested_us = options.tick_period.as_micros() as u64,
                "countdown tick period too short, using 1 ms"
            );
            MIN_TICK_PERIOD
        } else {
            options.tick_period
        };
        let runtime = Self {
            machine: EscalationMachine::new(),
            config,
            dispatcher,
            classifier,
            metrics,
            tick_period,
            clock: RuntimeClock::start(),
            commands: rx,
            loopback: tx.downgrade(),
            view: view_tx,
            countdown: None,
            listening: None,
            sessions_started: 0,
            emergencies_dispatched: 0,
        };
        let task = tokio::spawn(runtime.run());
        (EscalationHandle { tx, view: view_rx }, task)
    }

    async fn run(mut self) {
        info!(tick_ms = self.tick_period.as_millis() as u64, "escalation runtime started");
        let mut batch = Vec::new();
        // Ends on Shutdown or once every handle and child task has dropped its sender.
        while let Some(first) = self.commands.recv().await {
            batch.push(first);
            while let Ok(cmd) = self.commands.try_recv() {
                batch.push(cmd);
            }
            prioritize(&mut batch);

            let mut stop = false;
            for cmd in batch.drain(..) {
                if matches!(cmd, EscalationCommand::Shutdown) {
                    stop = true;
                    break;
                }
                self.handle(cmd);
            }
            self.publish();
            if stop {
                break;
            }
        }

        let effects = self.machine.abort();
        self.apply(effects);
        self.publish();
        info!("escalation runtime stopped");
    }

    fn handle(&mut self, cmd: EscalationCommand) {
        let now = self.clock.now();
        let effects = match cmd {
            EscalationCommand::Reading {
                sample,
                location,
                config,
            } => {
                if let Some(config) = config {
                    self.config = config;
                }
                self.machine.on_reading(sample, location, &self.config, now)
            }
            EscalationCommand::Physical(response) => self.machine.on_physical(response, now),
            EscalationCommand::Typed(text) => self.handle_text(&text, now),
            EscalationCommand::Tick(epoch) => self.machine.on_tick(epoch, now),
            EscalationCommand::Heard { epoch, utterance } => {
                self.machine.on_utterance(epoch, utterance, now)
            }
            EscalationCommand::Shutdown => Vec::new(),
        };
        self.apply(effects);
    }

    fn handle_text(&mut self, text: &str, now: DateTime<Utc>) -> Vec<Effect> {
        match (self.machine.stage(), self.machine.current_epoch()) {
            (PromptStage::Physical, _) => match physical_from_text(text) {
                Some(response) => self.machine.on_physical(response, now),
                None => {
                    debug!(%text, "typed text is not a yes/no answer");
                    Vec::new()
                }
            },
            (PromptStage::Voice, Some(epoch)) => {
                self.machine
                    .on_utterance(epoch, Utterance::from_transcript(text), now)
            }
            _ => {
                debug!(%text, "typed text with no prompt showing");
                Vec::new()
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SessionStarted { heart_rate } => {
                    self.sessions_started += 1;
                    if let Some(m) = &self.metrics {
                        m.observe_session_started();
                    }
                    debug!(heart_rate, "escalation session opened");
                }
                Effect::StartCountdown { epoch, seconds } => {
                    cancel(&mut self.countdown);
                    self.countdown = self.spawn_countdown(epoch, seconds);
                }
                Effect::CancelCountdown => cancel(&mut self.countdown),
                Effect::StartListening { epoch } => {
                    cancel(&mut self.listening);
                    self.listening = self.spawn_listening(epoch);
                }
                Effect::CancelListening => cancel(&mut self.listening),
                Effect::DispatchEmergency { snapshot, location } => {
                    self.emergencies_dispatched += 1;
                    let ctx = DispatchContext::new(self.config.context_tag.clone())
                        .with_location(location);
                    // Detached; the dispatcher logs and counts the outcome.
                    drop(self.dispatcher.send_emergency(&snapshot, &ctx));
                }
                Effect::Resolved(resolution) => {
                    if let Some(m) = &self.metrics {
                        m.observe_resolution(resolution.label());
                    }
                }
            }
        }
    }

    fn spawn_countdown(&self, epoch: CountdownEpoch, seconds: u32) -> Option<JoinHandle<()>> {
        let tx = self.loopback.upgrade()?;
        let period = self.tick_period;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            for _ in 0..seconds {
                ticker.tick().await;
                if tx.send(EscalationCommand::Tick(epoch)).await.is_err() {
                    break;
                }
            }
        }))
    }

    fn spawn_listening(&self, epoch: CountdownEpoch) -> Option<JoinHandle<()>> {
        let tx = self.loopback.upgrade()?;
        let classifier = Arc::clone(&self.classifier);
        let window = self.tick_period * RELISTEN_EVERY_SECONDS;
        Some(tokio::spawn(async move {
            let utterance = match classifier.listen(window).await {
                Ok(verdicts) => verdicts
                    .into_iter()
                    .find(|u| u.is_conclusive())
                    .unwrap_or(Utterance::Unknown),
                Err(e) => {
                    warn!(error = %e, "speech recognition failed, treating as no answer");
                    Utterance::Unknown
                }
            };
            if utterance.is_conclusive() {
                // Runtime may already be gone.
                let _ = tx.send(EscalationCommand::Heard { epoch, utterance }).await;
            }
        }))
    }

    fn publish(&self) {
        let view = EscalationView {
            stage: self.machine.stage(),
            countdown_seconds: self.machine.countdown(),
            display_severity: self.machine.display_severity(),
            last_emergency_sent_at: self.machine.last_emergency_sent_at(),
            sessions_started: self.sessions_started,
            emergencies_dispatched: self.emergencies_dispatched,
            timer_armed: self.countdown.is_some(),
        };
        if let Some(m) = &self.metrics {
            m.set_prompt_stage(view.stage.code());
        }
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

/// Aborting a finished task is a no-op, so this is safe to call repeatedly.
fn cancel(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
    }
}

pub(crate) fn physical_from_text(text: &str) -> Option<PhysicalResponse> {
    match text.trim().to_lowercase().as_str() {
        "y" | "yes" | "safe" | "i'm safe" | "im safe" | "ok" => Some(PhysicalResponse::Safe),
        "n" | "no" | "help" => Some(PhysicalResponse::Help),
        other => match Utterance::from_transcript(other) {
            Utterance::Affirm => Some(PhysicalResponse::Safe),
            Utterance::Help => Some(PhysicalResponse::Help),
            Utterance::Unknown => None,
        },
    }
}
