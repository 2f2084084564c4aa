use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use vitals_core::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Snapshot,
    Emergency,
}

impl DispatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchKind::Snapshot => "snapshot",
            DispatchKind::Emergency => "emergency",
        }
    }
}

/// Counters and gauges for one monitoring client. Owns its registry so that
/// several instances (tests, multiple wearers) never collide on registration.
#[derive(Clone)]
pub struct EscalationMetrics {
    registry: Registry,
    pub ticks_total: IntCounterVec,
    pub sessions_started_total: IntCounter,
    pub resolutions_total: IntCounterVec,
    pub dispatch_total: IntCounterVec,
    pub prompt_stage: IntGauge,
    pub heart_rate_bpm: IntGauge,
}

impl EscalationMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("wristbud".into()), None)?;

        let ticks_total = IntCounterVec::new(
            Opts::new("ticks_total", "Sampling ticks by heart-rate severity"),
            &["severity"],
        )?;
        let sessions_started_total = IntCounter::new(
            "escalation_sessions_started_total",
            "Escalation sessions that entered the physical prompt",
        )?;
        let resolutions_total = IntCounterVec::new(
            Opts::new(
                "escalation_resolutions_total",
                "Escalation sessions by how they ended",
            ),
            &["outcome"],
        )?;
        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Telemetry dispatch attempts"),
            &["kind", "result"],
        )?;
        let prompt_stage = IntGauge::new(
            "prompt_stage",
            "Active prompt stage (0 none, 1 physical, 2 voice)",
        )?;
        let heart_rate_bpm = IntGauge::new("heart_rate_bpm", "Last sampled heart rate")?;

        registry.register(Box::new(ticks_total.clone()))?;
        registry.register(Box::new(sessions_started_total.clone()))?;
        registry.register(Box::new(resolutions_total.clone()))?;
        registry.register(Box::new(dispatch_total.clone()))?;
        registry.register(Box::new(prompt_stage.clone()))?;
        registry.register(Box::new(heart_rate_bpm.clone()))?;

        Ok(Self {
            registry,
            ticks_total,
            sessions_started_total,
            resolutions_total,
            dispatch_total,
            prompt_stage,
            heart_rate_bpm,
        })
    }

    pub fn observe_tick(&self, heart_rate: u32, severity: Severity) {
        self.ticks_total
            .with_label_values(&[severity.as_status()])
            .inc();
        self.heart_rate_bpm.set(i64::from(heart_rate));
    }

    pub fn observe_session_started(&self) {
        self.sessions_started_total.inc();
    }

    pub fn observe_resolution(&self, outcome: &str) {
        self.resolutions_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_dispatch(&self, kind: DispatchKind, delivered: bool) {
        let result = if delivered { "ok" } else { "failed" };
        self.dispatch_total
            .with_label_values(&[kind.as_str(), result])
            .inc();
    }

    pub fn set_prompt_stage(&self, stage_code: i64) {
        self.prompt_stage.set(stage_code);
    }

    /// Prometheus text exposition of everything in this registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
