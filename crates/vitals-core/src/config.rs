use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONTEXT_TAG: &str = "Monitoring";
pub const DEFAULT_COOLDOWN_MINUTES: u32 = 15;
pub const DEFAULT_SERVER_HOST: &str = "192.168.1.100";
pub const DEFAULT_SERVER_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("prompt cooldown must be non-negative, got {0} minutes")]
    NegativeCooldown(i64),
    #[error("preference file I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("preference file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("preference store lock poisoned")]
    Poisoned,
}

/// Runtime settings read by the core at decision time. Never mutated by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub monitoring_enabled: bool,
    pub prompting_enabled: bool,
    pub cooldown_minutes: u32,
    pub context_tag: String,
    pub server_endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitoring_enabled: true,
            prompting_enabled: true,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            context_tag: DEFAULT_CONTEXT_TAG.to_string(),
            server_endpoint: DEFAULT_SERVER_HOST.to_string(),
        }
    }
}

impl Config {
    /// Base URL for the telemetry API. Bare hosts get the default scheme and port.
    pub fn api_base(&self) -> String {
        let endpoint = self.server_endpoint.trim();
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.trim_end_matches('/').to_string();
        }
        let host = if endpoint.is_empty() {
            DEFAULT_SERVER_HOST
        } else {
            endpoint
        };
        format!("http://{host}:{DEFAULT_SERVER_PORT}")
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cooldown_minutes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_id: i64,
    pub token: String,
}

impl Credentials {
    /// Mirrors the registration backend: a negative id or blank token means "logged out".
    pub fn is_valid(&self) -> bool {
        self.user_id >= 0 && !self.token.trim().is_empty()
    }
}

/// Flat key-value persistence for [`Config`] and login credentials.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Config, ConfigError>;
    fn store(&self, config: &Config) -> Result<(), ConfigError>;
    fn credentials(&self) -> Result<Option<Credentials>, ConfigError>;
    fn store_credentials(&self, credentials: Option<&Credentials>) -> Result<(), ConfigError>;

    /// The only place a signed cooldown enters the system.
    fn set_cooldown_minutes(&self, minutes: i64) -> Result<(), ConfigError> {
        let minutes = u32::try_from(minutes).map_err(|_| ConfigError::NegativeCooldown(minutes))?;
        let mut config = self.load()?;
        config.cooldown_minutes = minutes;
        self.store(&config)
    }
}

/// On-disk shape: every key optional so partial files fall back to defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    monitoring_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompting_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prompt_cooldown: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_token: Option<String>,
}

impl StoredPreferences {
    fn to_config(&self) -> Config {
        let defaults = Config::default();
        let cooldown_minutes = match self.prompt_cooldown {
            None => defaults.cooldown_minutes,
            Some(m) if m < 0 => {
                warn!(stored = m, "negative prompt cooldown in preferences, clamping to 0");
                0
            }
            Some(m) => u32::try_from(m).unwrap_or(u32::MAX),
        };
        Config {
            monitoring_enabled: self.monitoring_enabled.unwrap_or(defaults.monitoring_enabled),
            prompting_enabled: self.prompting_enabled.unwrap_or(defaults.prompting_enabled),
            cooldown_minutes,
            context_tag: self.context_tag.clone().unwrap_or(defaults.context_tag),
            server_endpoint: self.server_ip.clone().unwrap_or(defaults.server_endpoint),
        }
    }

    fn apply_config(&mut self, config: &Config) {
        self.monitoring_enabled = Some(config.monitoring_enabled);
        self.prompting_enabled = Some(config.prompting_enabled);
        self.context_tag = Some(config.context_tag.clone());
        self.prompt_cooldown = Some(i64::from(config.cooldown_minutes));
        self.server_ip = Some(config.server_endpoint.clone());
    }

    fn credentials(&self) -> Option<Credentials> {
        let creds = Credentials {
            user_id: self.user_id?,
            token: self.user_token.clone()?,
        };
        creds.is_valid().then_some(creds)
    }

    fn apply_credentials(&mut self, credentials: Option<&Credentials>) {
        self.user_id = credentials.map(|c| c.user_id);
        self.user_token = credentials.map(|c| c.token.clone());
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: RwLock<StoredPreferences>,
}

impl MemoryPreferenceStore {
    pub fn new(config: Config, credentials: Option<Credentials>) -> Self {
        let mut prefs = StoredPreferences::default();
        prefs.apply_config(&config);
        prefs.apply_credentials(credentials.as_ref());
        Self {
            inner: RwLock::new(prefs),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Config, ConfigError> {
        let prefs = self.inner.read().map_err(|_| ConfigError::Poisoned)?;
        Ok(prefs.to_config())
    }

    fn store(&self, config: &Config) -> Result<(), ConfigError> {
        let mut prefs = self.inner.write().map_err(|_| ConfigError::Poisoned)?;
        prefs.apply_config(config);
        Ok(())
    }

    fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        let prefs = self.inner.read().map_err(|_| ConfigError::Poisoned)?;
        Ok(prefs.credentials())
    }

    fn store_credentials(&self, credentials: Option<&Credentials>) -> Result<(), ConfigError> {
        let mut prefs = self.inner.write().map_err(|_| ConfigError::Poisoned)?;
        prefs.apply_credentials(credentials);
        Ok(())
    }
}

/// JSON file backed store. A missing file reads as all defaults.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredPreferences, ConfigError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoredPreferences::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, prefs: &StoredPreferences) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(prefs)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.read()?.to_config())
    }

    fn store(&self, config: &Config) -> Result<(), ConfigError> {
        let mut prefs = self.read()?;
        prefs.apply_config(config);
        self.write(&prefs)
    }

    fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        Ok(self.read()?.credentials())
    }

    fn store_credentials(&self, credentials: Option<&Credentials>) -> Result<(), ConfigError> {
        let mut prefs = self.read()?;
        prefs.apply_credentials(credentials);
        self.write(&prefs)
    }
}
