use crate::payload::{
    DemoRequest, DemoResponse, EmergencyPayload, LoginRequest, LoginResponse, SnapshotPayload,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use vitals_core::{ConfigError, Credentials, Location, PreferenceStore};

pub const SNAPSHOT_PATH: &str = "/api/update_health";
pub const EMERGENCY_PATH: &str = "/api/emergency_alert";
pub const LOGIN_PATH: &str = "/api/login";
pub const DEMO_PATH: &str = "/api/demo";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no stored credentials, skipping upload")]
    NotAuthenticated,
    #[error("preferences unavailable: {0}")]
    Config(#[from] ConfigError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("login refused: {0}")]
    LoginRefused(String),
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// Delivery side of telemetry. Implementations own any retry policy.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post_snapshot(&self, payload: &SnapshotPayload) -> Result<(), DispatchError>;
    async fn post_emergency(&self, payload: &EmergencyPayload) -> Result<(), DispatchError>;
}

/// JSON over HTTP with bearer-token auth. Endpoint and credentials are read
/// from the preference store on every call so settings changes apply at once.
pub struct HttpNotifier {
    client: reqwest::Client,
    prefs: Arc<dyn PreferenceStore>,
}

impl HttpNotifier {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, prefs })
    }

    /// Exchanges email and password for a session and stores it, replacing
    /// any previous credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credentials, DispatchError> {
        let url = format!("{}{}", self.prefs.load()?.api_base(), LOGIN_PATH);
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse = self.exchange(&url, None, &request).await?;
        let credentials = response.credentials().ok_or_else(|| {
            DispatchError::LoginRefused(
                response
                    .error
                    .clone()
                    .unwrap_or_else(|| "Login failed".to_string()),
            )
        })?;
        self.prefs.store_credentials(Some(&credentials))?;
        info!(user_id = credentials.user_id, "logged in");
        Ok(credentials)
    }

    /// Asks the backend to generate and record one reading for `scenario`
    /// (`critical`, `abnormal` or `normal`).
    pub async fn post_demo(
        &self,
        scenario: &str,
        location: &Location,
    ) -> Result<DemoResponse, DispatchError> {
        let credentials = self
            .prefs
            .credentials()?
            .filter(Credentials::is_valid)
            .ok_or(DispatchError::NotAuthenticated)?;
        let url = format!("{}{}/{}", self.prefs.load()?.api_base(), DEMO_PATH, scenario);
        self.exchange(&url, Some(&credentials.token), &DemoRequest::new(location))
            .await
    }

    async fn exchange<T, R>(
        &self,
        url: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<R, DispatchError>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<R>().await?)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), DispatchError> {
        let credentials = self
            .prefs
            .credentials()?
            .ok_or(DispatchError::NotAuthenticated)?;
        let url = format!("{}{}", self.prefs.load()?.api_base(), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&credentials.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            debug!(%url, response = %text, "upload accepted");
            Ok(())
        } else {
            Err(DispatchError::Rejected {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn post_snapshot(&self, payload: &SnapshotPayload) -> Result<(), DispatchError> {
        self.post(SNAPSHOT_PATH, payload).await
    }

    async fn post_emergency(&self, payload: &EmergencyPayload) -> Result<(), DispatchError> {
        self.post(EMERGENCY_PATH, payload).await
    }
}

/// Records every attempted payload in memory, then succeeds or fails as
/// configured. Backs offline runs and the dispatch-failure tests.
#[derive(Default)]
pub struct MemoryNotifier {
    snapshots: Mutex<Vec<SnapshotPayload>>,
    emergencies: Mutex<Vec<EmergencyPayload>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    pub fn snapshots(&self) -> Vec<SnapshotPayload> {
        self.snapshots.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn emergencies(&self) -> Vec<EmergencyPayload> {
        self.emergencies.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<(), DispatchError> {
        let failing = self.failing.lock().map(|f| *f).unwrap_or(false);
        if failing {
            Err(DispatchError::Unavailable("memory notifier set to fail".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn post_snapshot(&self, payload: &SnapshotPayload) -> Result<(), DispatchError> {
        self.snapshots
            .lock()
            .map_err(|_| DispatchError::Unavailable("snapshot log poisoned".into()))?
            .push(payload.clone());
        self.check()
    }

    async fn post_emergency(&self, payload: &EmergencyPayload) -> Result<(), DispatchError> {
        self.emergencies
            .lock()
            .map_err(|_| DispatchError::Unavailable("emergency log poisoned".into()))?
            .push(payload.clone());
        self.check()
    }
}
