use crate::{
    DispatchContext, DispatchError, DispatchKind, EmergencyPayload, HttpNotifier, LoginResponse,
    MemoryNotifier, Notifier, SnapshotPayload, TelemetryDispatcher,
};
use chrono::Utc;
use prometheus_bridge::EscalationMetrics;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vitals_core::{
    Config, Credentials, Location, MemoryPreferenceStore, PreferenceStore, Severity, VitalSample,
};

fn critical_sample() -> VitalSample {
    VitalSample {
        heart_rate_bpm: 182,
        systolic_mmhg: 141,
        diastolic_mmhg: 93,
        spo2_pct: 96,
        temperature_f: 100.2,
        activity_level: 3.0,
        timestamp: Utc::now(),
    }
}

#[test]
fn snapshot_payload_uses_backend_keys() {
    let loc = Location::new(13.1383751, 123.7387682);
    let payload = SnapshotPayload::new(&critical_sample(), Severity::Critical, "Work", Some(&loc));
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["heart_rate"], 182);
    assert_eq!(json["temperature"], 100);
    assert_eq!(json["status"], "critical");
    assert_eq!(json["activity"], "Light Activity");
    assert_eq!(json["context_tag"], "Work");
    assert_eq!(json["location_address"], "Lat: 13.1384, Lng: 123.7388");
}

#[test]
fn snapshot_without_location_omits_location_keys() {
    let payload = SnapshotPayload::new(&critical_sample(), Severity::Critical, "Work", None);
    let json = serde_json::to_value(&payload).unwrap();
    assert!(json.get("location_latitude").is_none());
    assert!(json.get("location_address").is_none());
}

#[test]
fn emergency_payload_reports_missing_location() {
    let payload = EmergencyPayload::new(&critical_sample(), "Monitoring", None);
    assert_eq!(payload.blood_pressure, "141/93");
    assert_eq!(payload.location_address, "Location unavailable");
    assert_eq!(payload.status, "critical");

    let loc = Location::new(1.0, 2.0);
    let located = EmergencyPayload::new(&critical_sample(), "Monitoring", Some(&loc));
    assert_eq!(located.location_address, "Emergency Location: Lat 1.0000, Lng 2.0000");

    let labelled = EmergencyPayload::new(
        &critical_sample(),
        "Monitoring",
        Some(&Location::new(1.0, 2.0).with_label("Clinic lobby")),
    );
    assert_eq!(labelled.location_address, "Clinic lobby");
}

#[tokio::test]
async fn snapshot_skipped_without_heart_rate() {
    let notifier = Arc::new(MemoryNotifier::new());
    let dispatcher = TelemetryDispatcher::new(notifier.clone());
    let handle = dispatcher.send_snapshot(
        &VitalSample::unavailable(Utc::now()),
        Severity::Normal,
        &DispatchContext::new("Monitoring"),
    );
    assert!(handle.is_none());
    assert!(notifier.snapshots().is_empty());
}

#[tokio::test]
async fn failures_are_reported_not_raised() {
    let notifier = Arc::new(MemoryNotifier::failing());
    let metrics = EscalationMetrics::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = TelemetryDispatcher::new(notifier.clone())
        .with_metrics(metrics.clone())
        .with_outcomes(tx);

    dispatcher
        .send_emergency(&critical_sample(), &DispatchContext::new("Monitoring"))
        .await
        .unwrap();

    let outcome = rx.recv().await.unwrap();
    assert_eq!(outcome.kind, DispatchKind::Emergency);
    assert!(!outcome.delivered);
    assert!(outcome.error.unwrap().contains("memory notifier"));
    assert_eq!(notifier.emergencies().len(), 1);
    assert_eq!(
        metrics
            .dispatch_total
            .with_label_values(&["emergency", "failed"])
            .get(),
        1
    );
}

#[tokio::test]
async fn delivered_snapshot_is_recorded() {
    let notifier = Arc::new(MemoryNotifier::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = TelemetryDispatcher::new(notifier.clone()).with_outcomes(tx);
    let ctx = DispatchContext::new("Gym").with_location(Some(Location::new(0.5, 0.25)));

    dispatcher
        .send_snapshot(&critical_sample(), Severity::Critical, &ctx)
        .unwrap()
        .await
        .unwrap();

    assert!(rx.recv().await.unwrap().delivered);
    let sent = notifier.snapshots();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].context_tag, "Gym");
    assert_eq!(sent[0].location_latitude, Some(0.5));
}

#[tokio::test]
async fn http_notifier_refuses_without_credentials() {
    let prefs = Arc::new(MemoryPreferenceStore::new(Config::default(), None));
    let notifier = HttpNotifier::new(prefs).unwrap();
    let payload = SnapshotPayload::new(&critical_sample(), Severity::Critical, "Monitoring", None);
    let err = notifier.post_snapshot(&payload).await.unwrap_err();
    assert!(matches!(err, DispatchError::NotAuthenticated));
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(split) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..split]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= split + 4 + length
}

/// Answers a single HTTP request with `status` and a JSON `body`; the task
/// yields the raw request, lowercased.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        while !request_complete(&raw) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }
        let reply = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(reply.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&raw).to_lowercase()
    });
    (base, task)
}

fn prefs_for(base: &str, credentials: Option<Credentials>) -> Arc<MemoryPreferenceStore> {
    let config = Config {
        server_endpoint: base.to_string(),
        ..Config::default()
    };
    Arc::new(MemoryPreferenceStore::new(config, credentials))
}

#[tokio::test]
async fn login_stores_the_returned_session() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"user_id":7,"token":"tok-7","email":"ana@example.com","name":"Ana","message":"Login successful"}"#,
    )
    .await;
    let prefs = prefs_for(&base, None);
    let notifier = HttpNotifier::new(prefs.clone()).unwrap();

    let credentials = notifier.login(" ana@example.com ", "hunter2").await.unwrap();
    assert_eq!(credentials.user_id, 7);
    assert_eq!(credentials.token, "tok-7");
    assert_eq!(prefs.credentials().unwrap(), Some(credentials));

    let request = server.await.unwrap();
    assert!(request.starts_with("post /api/login "));
    assert!(request.contains(r#""email":"ana@example.com""#));
    assert!(request.contains(r#""password":"hunter2""#));
    assert!(!request.contains("authorization:"));
}

#[tokio::test]
async fn login_error_body_is_refused() {
    let (base, server) = serve_once("200 OK", r#"{"error":"Invalid email or password"}"#).await;
    let prefs = prefs_for(&base, None);
    let notifier = HttpNotifier::new(prefs.clone()).unwrap();

    let err = notifier.login("ana@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, DispatchError::LoginRefused(ref m) if m == "Invalid email or password"));
    assert_eq!(prefs.credentials().unwrap(), None);
    server.await.unwrap();
}

#[tokio::test]
async fn login_rejection_keeps_status() {
    let (base, server) = serve_once("401 Unauthorized", r#"{"error":"nope"}"#).await;
    let notifier = HttpNotifier::new(prefs_for(&base, None)).unwrap();
    let err = notifier.login("ana@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, DispatchError::Rejected { status: 401, .. }));
    server.await.unwrap();
}

#[tokio::test]
async fn demo_upload_sends_location_with_bearer_token() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"message":"Demo data generated","data":{"heart_rate":185,"systolic":190,"diastolic":120,"spo2":80,"temperature":104.2}}"#,
    )
    .await;
    let credentials = Credentials {
        user_id: 7,
        token: "tok-7".into(),
    };
    let notifier = HttpNotifier::new(prefs_for(&base, Some(credentials))).unwrap();
    let location = Location::new(13.138375, 123.738768).with_label("Clinic lobby");

    let response = notifier.post_demo("critical", &location).await.unwrap();
    assert_eq!(response.message.as_deref(), Some("Demo data generated"));
    let data = response.data.unwrap();
    assert_eq!((data.heart_rate, data.systolic, data.spo2), (185, 190, 80));

    let request = server.await.unwrap();
    assert!(request.starts_with("post /api/demo/critical "));
    assert!(request.contains("authorization: bearer tok-7"));
    assert!(request.contains(r#""demo_mode":true"#));
    assert!(request.contains(r#""location_address":"clinic lobby""#));
}

#[tokio::test]
async fn demo_upload_requires_login() {
    let notifier = HttpNotifier::new(prefs_for("http://127.0.0.1:9", None)).unwrap();
    let err = notifier
        .post_demo("normal", &Location::new(0.0, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotAuthenticated));
}

#[test]
fn login_response_needs_id_and_token() {
    let full: LoginResponse =
        serde_json::from_str(r#"{"user_id":3,"token":"t","message":"ok"}"#).unwrap();
    assert_eq!(
        full.credentials(),
        Some(Credentials {
            user_id: 3,
            token: "t".into()
        })
    );
    let partial: LoginResponse = serde_json::from_str(r#"{"user_id":3}"#).unwrap();
    assert_eq!(partial.credentials(), None);
    let blank: LoginResponse = serde_json::from_str(r#"{"user_id":3,"token":" "}"#).unwrap();
    assert_eq!(blank.credentials(), None);
}
