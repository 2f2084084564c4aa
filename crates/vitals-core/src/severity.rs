use crate::sample::VitalSample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered so that `max` over tiers yields the worst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Abnormal,
    Critical,
}

impl Severity {
    pub fn as_status(self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Abnormal => "abnormal",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_status())
    }
}

/// Heart-rate tier. This alone decides escalation eligibility.
pub fn classify(heart_rate: u32) -> Severity {
    if heart_rate == 0 {
        Severity::Normal
    } else if heart_rate < 50 || heart_rate > 150 {
        Severity::Critical
    } else if heart_rate < 60 || heart_rate > 130 {
        Severity::Abnormal
    } else {
        Severity::Normal
    }
}

pub fn classify_systolic(systolic: u32) -> Option<Severity> {
    match systolic {
        0 => None,
        s if s > 140 => Some(Severity::Critical),
        s if s > 130 => Some(Severity::Abnormal),
        _ => Some(Severity::Normal),
    }
}

pub fn classify_spo2(spo2: u8) -> Option<Severity> {
    match spo2 {
        0 => None,
        s if s < 95 => Some(Severity::Critical),
        s if s < 97 => Some(Severity::Abnormal),
        _ => Some(Severity::Normal),
    }
}

pub fn classify_temperature(temperature_f: f32) -> Option<Severity> {
    if temperature_f <= 0.0 {
        None
    } else if temperature_f < 97.0 || temperature_f > 100.4 {
        Some(Severity::Critical)
    } else if temperature_f < 98.0 || temperature_f > 99.5 {
        Some(Severity::Abnormal)
    } else {
        Some(Severity::Normal)
    }
}

/// Per-vital tiers for display. `None` marks a vital with no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalAssessment {
    pub heart_rate: Option<Severity>,
    pub blood_pressure: Option<Severity>,
    pub spo2: Option<Severity>,
    pub temperature: Option<Severity>,
    pub overall: Severity,
}

pub fn assess(sample: &VitalSample) -> VitalAssessment {
    let heart_rate = sample
        .has_signal()
        .then(|| classify(sample.heart_rate_bpm));
    let blood_pressure = classify_systolic(sample.systolic_mmhg);
    let spo2 = classify_spo2(sample.spo2_pct);
    let temperature = classify_temperature(sample.temperature_f);
    let overall = [heart_rate, blood_pressure, spo2, temperature]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(Severity::Normal);
    VitalAssessment {
        heart_rate,
        blood_pressure,
        spo2,
        temperature,
        overall,
    }
}
