use crate::sensor::{SensorError, SensorSource};
use chrono::{DateTime, Utc};
use escalation_guards::{EscalationError, EscalationHandle};
use prometheus_bridge::EscalationMetrics;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use telemetry_dispatch::{DispatchContext, TelemetryDispatcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vitals_core::{
    assess, classify, estimate_temperature, BloodPressure, Config, Location, PreferenceStore,
    Severity, VitalAssessment, VitalEstimator, VitalSample,
};

pub const SAMPLE_PERIOD: Duration = Duration::from_secs(5);
/// Shortest sampling period accepted by [`Monitor::with_period`].
pub const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("sensor source failed to start: {0}")]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Escalation(#[from] EscalationError),
}

/// Result of one sampling tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorTick {
    pub sample: VitalSample,
    /// Heart-rate tier; the only input to escalation.
    pub severity: Severity,
    pub assessment: VitalAssessment,
    pub location: Option<Location>,
}

pub struct Monitor {
    source: Box<dyn SensorSource>,
    estimator: VitalEstimator<StdRng>,
    prefs: Arc<dyn PreferenceStore>,
    config: Config,
    dispatcher: TelemetryDispatcher,
    escalation: EscalationHandle,
    metrics: Option<EscalationMetrics>,
    ticks: Option<mpsc::UnboundedSender<MonitorTick>>,
    period: Duration,
}

impl Monitor {
    pub fn new(
        source: Box<dyn SensorSource>,
        prefs: Arc<dyn PreferenceStore>,
        dispatcher: TelemetryDispatcher,
        escalation: EscalationHandle,
    ) -> Self {
        let config = prefs.load().unwrap_or_else(|e| {
            warn!(error = %e, "could not read preferences, starting from defaults");
            Config::default()
        });
        Self {
            source,
            estimator: VitalEstimator::from_entropy(),
            prefs,
            config,
            dispatcher,
            escalation,
            metrics: None,
            ticks: None,
            period: SAMPLE_PERIOD,
        }
    }

    pub fn with_estimator(mut self, estimator: VitalEstimator<StdRng>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_metrics(mut self, metrics: EscalationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        if period < MIN_SAMPLE_PERIOD {
            warn!(
                requested_us = period.as_micros() as u64,
                "sampling period too short, using 1 ms"
            );
            self.period = MIN_SAMPLE_PERIOD;
        } else {
            self.period = period;
        }
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Every produced tick is also sent here.
    pub fn with_tick_sink(mut self, tx: mpsc::UnboundedSender<MonitorTick>) -> Self {
        self.ticks = Some(tx);
        self
    }

    /// Polls and estimates. `None` while monitoring is switched off.
    pub fn sample(&mut self, now: DateTime<Utc>) -> Option<MonitorTick> {
        match self.prefs.load() {
            Ok(config) => self.config = config,
            Err(e) => warn!(error = %e, "preference read failed, keeping previous settings"),
        }
        if !self.config.monitoring_enabled {
            debug!("monitoring disabled, skipping sample");
            return None;
        }

        let (sample, location) = match self.source.poll(now) {
            Ok(raw) if raw.heart_rate_bpm > 0 => {
                let hr = raw.heart_rate_bpm;
                let estimate = self.estimator.estimate(
                    hr,
                    raw.activity_level,
                    raw.blood_pressure.is_some(),
                    raw.spo2_pct.is_some(),
                );
                let (systolic_mmhg, diastolic_mmhg) = raw
                    .blood_pressure
                    .or(estimate.blood_pressure)
                    .unwrap_or(BloodPressure::Unavailable)
                    .parts();
                let sample = VitalSample {
                    heart_rate_bpm: hr,
                    systolic_mmhg,
                    diastolic_mmhg,
                    spo2_pct: raw.spo2_pct.or(estimate.spo2_pct).unwrap_or(0),
                    temperature_f: raw
                        .body_temperature_f
                        .unwrap_or_else(|| estimate_temperature(hr, raw.ambient_temperature_f)),
                    activity_level: raw.activity_level,
                    timestamp: now,
                };
                (sample, raw.location)
            }
            Ok(raw) => (VitalSample::unavailable(now), raw.location),
            Err(e) => {
                debug!(error = %e, "no sensor data this tick");
                (VitalSample::unavailable(now), None)
            }
        };

        Some(MonitorTick {
            severity: classify(sample.heart_rate_bpm),
            assessment: assess(&sample),
            sample,
            location,
        })
    }

    /// One full sampling tick: sample, upload a snapshot, feed escalation.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<MonitorTick>, MonitorError> {
        let Some(tick) = self.sample(now) else {
            return Ok(None);
        };

        if tick.sample.has_signal() {
            let ctx = DispatchContext::new(self.config.context_tag.clone())
                .with_location(tick.location.clone());
            // Fire and forget; the dispatcher records the outcome.
            drop(self.dispatcher.send_snapshot(&tick.sample, tick.severity, &ctx));
        }
        if let Some(m) = &self.metrics {
            m.observe_tick(tick.sample.heart_rate_bpm, tick.severity);
        }
        self.escalation
            .submit_reading_with_config(
                tick.sample.clone(),
                tick.location.clone(),
                self.config.clone(),
            )
            .await?;

        debug!(
            heart_rate = tick.sample.heart_rate_bpm,
            severity = %tick.severity,
            overall = %tick.assessment.overall,
            "vitals sampled"
        );
        if let Some(tx) = &self.ticks {
            let _ = tx.send(tick.clone());
        }
        Ok(Some(tick))
    }

    /// Samples every period until `shutdown` fires or the escalation runtime stops.
    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) -> Result<(), MonitorError> {
        let caps = self.source.capabilities();
        if !caps.heart_rate {
            warn!("sensor source has no heart rate, every sample will be unavailable");
        }
        self.source.start()?;
        info!(period_ms = self.period.as_millis() as u64, ?caps, "monitoring started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("monitor shutdown requested");
                    break Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        break Err(e);
                    }
                }
            }
        };

        self.source.stop();
        info!("monitoring stopped");
        result
    }
}
