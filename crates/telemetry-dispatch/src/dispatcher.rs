use crate::notifier::Notifier;
use crate::payload::{EmergencyPayload, SnapshotPayload};
use prometheus_bridge::{DispatchKind, EscalationMetrics};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use vitals_core::{Location, Severity, VitalSample};

/// Per-dispatch context that is not part of the vital sample itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchContext {
    pub context_tag: String,
    pub location: Option<Location>,
}

impl DispatchContext {
    pub fn new(context_tag: impl Into<String>) -> Self {
        Self {
            context_tag: context_tag.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub kind: DispatchKind,
    pub heart_rate: u32,
    pub delivered: bool,
    pub error: Option<String>,
}

/// Fire-and-forget hand-off to the [`Notifier`]. Every send spawns its own
/// task on the current tokio runtime and returns immediately; failures are
/// logged and counted, never retried, never surfaced to the caller.
#[derive(Clone)]
pub struct TelemetryDispatcher {
    notifier: Arc<dyn Notifier>,
    metrics: Option<EscalationMetrics>,
    outcomes: Option<mpsc::UnboundedSender<DispatchOutcome>>,
}

impl TelemetryDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            metrics: None,
            outcomes: None,
        }
    }

    pub fn with_metrics(mut self, metrics: EscalationMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Mirror every outcome onto a channel, for hosts that surface delivery status.
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<DispatchOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Returns `None` without spawning when the sample carries no heart rate.
    pub fn send_snapshot(
        &self,
        sample: &VitalSample,
        severity: Severity,
        ctx: &DispatchContext,
    ) -> Option<JoinHandle<()>> {
        if !sample.has_signal() {
            return None;
        }
        let payload = SnapshotPayload::new(sample, severity, &ctx.context_tag, ctx.location.as_ref());
        let this = self.clone();
        Some(tokio::spawn(async move {
            let result = this.notifier.post_snapshot(&payload).await;
            match &result {
                Ok(()) => debug!(heart_rate = payload.heart_rate, status = %payload.status, "health snapshot sent"),
                Err(e) => error!(heart_rate = payload.heart_rate, error = %e, "failed to send health snapshot"),
            }
            this.record(DispatchKind::Snapshot, payload.heart_rate, result.err().map(|e| e.to_string()));
        }))
    }

    pub fn send_emergency(&self, sample: &VitalSample, ctx: &DispatchContext) -> JoinHandle<()> {
        let payload = EmergencyPayload::new(sample, &ctx.context_tag, ctx.location.as_ref());
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.notifier.post_emergency(&payload).await;
            match &result {
                Ok(()) => warn!(
                    heart_rate = payload.heart_rate,
                    location = %payload.location_address,
                    "EMERGENCY ALERT SENT"
                ),
                Err(e) => error!(heart_rate = payload.heart_rate, error = %e, "emergency alert send failed"),
            }
            this.record(DispatchKind::Emergency, payload.heart_rate, result.err().map(|e| e.to_string()));
        })
    }

    fn record(&self, kind: DispatchKind, heart_rate: u32, error: Option<String>) {
        let delivered = error.is_none();
        if let Some(metrics) = &self.metrics {
            metrics.observe_dispatch(kind, delivered);
        }
        if let Some(tx) = &self.outcomes {
            // Receiver may be gone; outcomes are advisory.
            let _ = tx.send(DispatchOutcome {
                kind,
                heart_rate,
                delivered,
                error,
            });
        }
    }
}
