use serde::{Deserialize, Serialize};
use vitals_core::{Credentials, Location, Severity, VitalSample};

pub const EMERGENCY_MESSAGE: &str = "Critical health alert triggered by smartwatch sensors";
pub const LOCATION_UNAVAILABLE: &str = "Location unavailable";

/// Periodic health snapshot, keyed the way the telemetry backend expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub heart_rate: u32,
    pub systolic: u32,
    pub diastolic: u32,
    pub spo2: u8,
    /// Whole degrees Fahrenheit.
    pub temperature: i32,
    pub status: String,
    pub activity: String,
    pub context_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_address: Option<String>,
}

impl SnapshotPayload {
    pub fn new(
        sample: &VitalSample,
        severity: Severity,
        context_tag: &str,
        location: Option<&Location>,
    ) -> Self {
        Self {
            heart_rate: sample.heart_rate_bpm,
            systolic: sample.systolic_mmhg,
            diastolic: sample.diastolic_mmhg,
            spo2: sample.spo2_pct,
            temperature: sample.temperature_f as i32,
            status: severity.as_status().to_string(),
            activity: sample.activity_label().to_string(),
            context_tag: context_tag.to_string(),
            location_latitude: location.map(|l| l.latitude),
            location_longitude: location.map(|l| l.longitude),
            location_address: location.map(snapshot_address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyPayload {
    pub heart_rate: u32,
    /// `"systolic/diastolic"`, or `"--/--"` when unknown.
    pub blood_pressure: String,
    pub systolic: u32,
    pub diastolic: u32,
    pub spo2: u8,
    pub temperature: f32,
    pub status: String,
    pub activity: String,
    pub message: String,
    pub context_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_longitude: Option<f64>,
    pub location_address: String,
}

impl EmergencyPayload {
    pub fn new(sample: &VitalSample, context_tag: &str, location: Option<&Location>) -> Self {
        Self {
            heart_rate: sample.heart_rate_bpm,
            blood_pressure: sample.blood_pressure().to_string(),
            systolic: sample.systolic_mmhg,
            diastolic: sample.diastolic_mmhg,
            spo2: sample.spo2_pct,
            temperature: sample.temperature_f,
            status: Severity::Critical.as_status().to_string(),
            activity: sample.activity_label().to_string(),
            message: EMERGENCY_MESSAGE.to_string(),
            context_tag: context_tag.to_string(),
            location_latitude: location.map(|l| l.latitude),
            location_longitude: location.map(|l| l.longitude),
            location_address: location
                .map(emergency_address)
                .unwrap_or_else(|| LOCATION_UNAVAILABLE.to_string()),
        }
    }
}

fn snapshot_address(location: &Location) -> String {
    location.label.clone().unwrap_or_else(|| {
        format!("Lat: {:.4}, Lng: {:.4}", location.latitude, location.longitude)
    })
}

fn emergency_address(location: &Location) -> String {
    location.label.clone().unwrap_or_else(|| {
        format!(
            "Emergency Location: Lat {:.4}, Lng {:.4}",
            location.latitude, location.longitude
        )
    })
}

/// Body of `POST /api/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The backend answers 200 with either the session fields or an `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    pub user_id: Option<i64>,
    pub token: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl LoginResponse {
    pub fn credentials(&self) -> Option<Credentials> {
        let credentials = Credentials {
            user_id: self.user_id?,
            token: self.token.clone()?,
        };
        credentials.is_valid().then_some(credentials)
    }
}

/// Body of `POST /api/demo/{scenario}`. The server generates the vitals; the
/// client only supplies where the reading should appear to come from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoRequest {
    pub location_latitude: f64,
    pub location_longitude: f64,
    pub location_address: String,
    pub demo_mode: bool,
}

impl DemoRequest {
    pub fn new(location: &Location) -> Self {
        Self {
            location_latitude: location.latitude,
            location_longitude: location.longitude,
            location_address: snapshot_address(location),
            demo_mode: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoVitals {
    pub heart_rate: u32,
    pub systolic: u32,
    pub diastolic: u32,
    pub spo2: u32,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoResponse {
    pub message: Option<String>,
    pub data: Option<DemoVitals>,
}
