use escalation_guards::{
    EscalationHandle, EscalationOptions, EscalationRuntime, PhysicalResponse, PromptStage,
    SilentClassifier,
};
use prometheus_bridge::EscalationMetrics;
use std::sync::Arc;
use std::time::Duration;
use telemetry_dispatch::{MemoryNotifier, TelemetryDispatcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vitals_core::{Config, MemoryPreferenceStore, PreferenceStore};
use wristbud_monitor::{Monitor, MonitorError, ScriptedSensorSource};

struct Loop {
    handle: EscalationHandle,
    notifier: Arc<MemoryNotifier>,
    metrics: EscalationMetrics,
    prefs: Arc<dyn PreferenceStore>,
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<Result<(), MonitorError>>,
}

fn start(config: Config, heart_rates: Vec<u32>) -> Loop {
    let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferenceStore::new(config, None));
    let notifier = Arc::new(MemoryNotifier::new());
    let metrics = EscalationMetrics::new().unwrap();
    let dispatcher = TelemetryDispatcher::new(notifier.clone()).with_metrics(metrics.clone());
    let (handle, _escalation) = EscalationRuntime::spawn(
        Arc::clone(&prefs),
        dispatcher.clone(),
        Arc::new(SilentClassifier),
        Some(metrics.clone()),
        EscalationOptions::default(),
    );
    let monitor = Monitor::new(
        Box::new(ScriptedSensorSource::from_heart_rates(heart_rates)),
        Arc::clone(&prefs),
        dispatcher,
        handle.clone(),
    )
    .with_metrics(metrics.clone());
    let (shutdown, rx) = mpsc::channel(1);
    let task = tokio::spawn(monitor.run(rx));
    Loop {
        handle,
        notifier,
        metrics,
        prefs,
        shutdown,
        task,
    }
}

impl Loop {
    async fn stop(self) {
        self.shutdown.send(()).await.unwrap();
        self.task.await.unwrap().unwrap();
    }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn sustained_critical_escalates_once_per_cooldown() {
    let rig = start(Config::default(), vec![190; 12]);
    advance(58).await;

    let view = rig.handle.view();
    assert_eq!(view.stage, PromptStage::None);
    assert_eq!(view.sessions_started, 1);
    assert_eq!(rig.notifier.emergencies().len(), 1);
    assert_eq!(rig.notifier.snapshots().len(), 12);
    assert!(rig.notifier.snapshots().iter().all(|s| s.status == "critical"));

    let rendered = rig.metrics.render().unwrap();
    assert!(rendered.contains("wristbud_escalation_sessions_started_total 1"));
    assert!(rendered.contains("wristbud_escalation_resolutions_total{outcome=\"voice_timeout\"} 1"));
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn help_answer_dispatches_immediately() {
    let rig = start(Config::default(), vec![180, 75, 75]);
    advance(3).await;
    assert_eq!(rig.handle.view().stage, PromptStage::Physical);

    rig.handle
        .respond_physical(PhysicalResponse::Help)
        .await
        .unwrap();
    advance(1).await;
    assert_eq!(rig.handle.view().stage, PromptStage::None);
    assert_eq!(rig.notifier.emergencies().len(), 1);
    assert_eq!(rig.notifier.emergencies()[0].heart_rate, 180);

    advance(30).await;
    assert_eq!(rig.notifier.emergencies().len(), 1);
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sensor_gaps_stay_quiet() {
    let rig = start(Config::default(), vec![0, 0, 0]);
    advance(14).await;
    let view = rig.handle.view();
    assert_eq!(view.stage, PromptStage::None);
    assert_eq!(view.sessions_started, 0);
    assert!(rig.notifier.snapshots().is_empty());
    assert!(rig.notifier.emergencies().is_empty());
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn monitoring_toggle_is_read_every_tick() {
    let rig = start(
        Config {
            monitoring_enabled: false,
            ..Config::default()
        },
        vec![72; 10],
    );
    advance(12).await;
    assert!(rig.notifier.snapshots().is_empty());

    let mut config = rig.prefs.load().unwrap();
    config.monitoring_enabled = true;
    rig.prefs.store(&config).unwrap();
    advance(10).await;
    assert!(!rig.notifier.snapshots().is_empty());
    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn zero_cooldown_prompts_again_after_confirmed_safe() {
    let rig = start(
        Config {
            cooldown_minutes: 0,
            ..Config::default()
        },
        vec![45; 4],
    );
    advance(1).await;
    assert_eq!(rig.handle.view().stage, PromptStage::Physical);
    rig.handle.respond_text("yes").await.unwrap();
    advance(1).await;
    assert_eq!(rig.handle.view().stage, PromptStage::None);

    advance(4).await;
    assert_eq!(rig.handle.view().stage, PromptStage::Physical);
    assert_eq!(rig.handle.view().sessions_started, 2);
    assert!(rig.notifier.emergencies().is_empty());
    rig.stop().await;
}
