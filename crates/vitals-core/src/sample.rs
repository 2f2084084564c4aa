use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One sampling tick worth of vitals. A heart rate of 0 means "no signal";
/// the other zero-valued vitals are likewise "unavailable", never a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalSample {
    pub heart_rate_bpm: u32,
    pub systolic_mmhg: u32,
    pub diastolic_mmhg: u32,
    pub spo2_pct: u8,
    pub temperature_f: f32,
    pub activity_level: f32,
    pub timestamp: DateTime<Utc>,
}

impl VitalSample {
    /// The suppressed sample produced when the sensor has nothing to offer.
    pub fn unavailable(timestamp: DateTime<Utc>) -> Self {
        Self {
            heart_rate_bpm: 0,
            systolic_mmhg: 0,
            diastolic_mmhg: 0,
            spo2_pct: 0,
            temperature_f: 0.0,
            activity_level: 0.0,
            timestamp,
        }
    }

    pub fn has_signal(&self) -> bool {
        self.heart_rate_bpm > 0
    }

    pub fn blood_pressure(&self) -> BloodPressure {
        BloodPressure::from_parts(self.systolic_mmhg, self.diastolic_mmhg)
    }

    pub fn activity_label(&self) -> ActivityLabel {
        ActivityLabel::from_level(self.activity_level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodPressure {
    Unavailable,
    Reading { systolic: u32, diastolic: u32 },
}

impl BloodPressure {
    pub fn from_parts(systolic: u32, diastolic: u32) -> Self {
        if systolic == 0 || diastolic == 0 {
            BloodPressure::Unavailable
        } else {
            BloodPressure::Reading {
                systolic,
                diastolic,
            }
        }
    }

    /// Flattens to the `(systolic, diastolic)` pair carried on the wire, 0/0 when unavailable.
    pub fn parts(self) -> (u32, u32) {
        match self {
            BloodPressure::Unavailable => (0, 0),
            BloodPressure::Reading {
                systolic,
                diastolic,
            } => (systolic, diastolic),
        }
    }
}

impl fmt::Display for BloodPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BloodPressure::Unavailable => f.write_str("--/--"),
            BloodPressure::Reading {
                systolic,
                diastolic,
            } => write!(f, "{systolic}/{diastolic}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Human-readable place name when the source knows one.
    pub label: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Coarse motion bucket derived from accelerometer magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityLabel {
    Resting,
    Light,
    Moderate,
    Active,
    HighIntensity,
}

impl ActivityLabel {
    pub fn from_level(level: f32) -> Self {
        if level < 2.0 {
            ActivityLabel::Resting
        } else if level < 5.0 {
            ActivityLabel::Light
        } else if level < 10.0 {
            ActivityLabel::Moderate
        } else if level < 15.0 {
            ActivityLabel::Active
        } else {
            ActivityLabel::HighIntensity
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLabel::Resting => "Resting",
            ActivityLabel::Light => "Light Activity",
            ActivityLabel::Moderate => "Moderate Activity",
            ActivityLabel::Active => "Active",
            ActivityLabel::HighIntensity => "High Intensity",
        }
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accelerometer magnitude, the activity level every other stage consumes.
pub fn activity_level_from_accel(x: f32, y: f32, z: f32) -> f32 {
    (x * x + y * y + z * z).sqrt()
}
