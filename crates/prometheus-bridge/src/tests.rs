use crate::{DispatchKind, EscalationMetrics};
use vitals_core::Severity;

#[test]
fn independent_registries_do_not_collide() {
    let a = EscalationMetrics::new().unwrap();
    let b = EscalationMetrics::new().unwrap();
    a.observe_session_started();
    assert_eq!(a.sessions_started_total.get(), 1);
    assert_eq!(b.sessions_started_total.get(), 0);
}

#[test]
fn render_exposes_labelled_counters() {
    let metrics = EscalationMetrics::new().unwrap();
    metrics.observe_tick(180, Severity::Critical);
    metrics.observe_dispatch(DispatchKind::Emergency, false);
    metrics.observe_resolution("voice_timeout");
    metrics.set_prompt_stage(2);

    let text = metrics.render().unwrap();
    assert!(text.contains("wristbud_ticks_total{severity=\"critical\"} 1"));
    assert!(text.contains("wristbud_dispatch_total{kind=\"emergency\",result=\"failed\"} 1"));
    assert!(text.contains("wristbud_escalation_resolutions_total{outcome=\"voice_timeout\"} 1"));
    assert!(text.contains("wristbud_heart_rate_bpm 180"));
    assert!(text.contains("wristbud_prompt_stage 2"));
}
