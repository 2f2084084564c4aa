use crate::sensor::{Capabilities, RawReading, SensorError, SensorSource};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use vitals_core::{BloodPressure, Location, Severity, VitalSample};

pub const DEMO_LATITUDE: f64 = 13.138375115992103;
pub const DEMO_LONGITUDE: f64 = 123.73876824232873;
pub const DEMO_ADDRESS: &str = "AMA legazpi city albay branch";

pub fn demo_location() -> Location {
    Location::new(DEMO_LATITUDE, DEMO_LONGITUDE).with_label(DEMO_ADDRESS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoScenario {
    Critical,
    Abnormal,
    Normal,
}

#[derive(Debug, Error)]
#[error("unknown demo scenario {0:?}, expected critical, abnormal or normal")]
pub struct UnknownScenario(pub String);

impl FromStr for DemoScenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(DemoScenario::Critical),
            "abnormal" => Ok(DemoScenario::Abnormal),
            "normal" => Ok(DemoScenario::Normal),
            _ => Err(UnknownScenario(s.to_string())),
        }
    }
}

impl fmt::Display for DemoScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status().as_status())
    }
}

/// A synthetic reading plus the labels the demo screen shows with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoReading {
    pub scenario: DemoScenario,
    pub sample: VitalSample,
    pub activity: &'static str,
    pub location: Location,
}

impl DemoScenario {
    /// Tier the scenario is meant to exercise.
    pub fn status(self) -> Severity {
        match self {
            DemoScenario::Critical => Severity::Critical,
            DemoScenario::Abnormal => Severity::Abnormal,
            DemoScenario::Normal => Severity::Normal,
        }
    }

    pub fn activity(self) -> &'static str {
        match self {
            DemoScenario::Critical => "Demo Mode - Critical Emergency",
            DemoScenario::Abnormal => "Demo Mode - Abnormal Values",
            DemoScenario::Normal => "Demo Mode - Normal Activity",
        }
    }

    pub fn generate<R: Rng + ?Sized>(self, rng: &mut R, now: DateTime<Utc>) -> DemoReading {
        let (heart_rate_bpm, systolic_mmhg, diastolic_mmhg, spo2_pct, temperature_f) = match self {
            DemoScenario::Critical => (
                rng.gen_range(180..200),
                rng.gen_range(180..200),
                rng.gen_range(110..130),
                rng.gen_range(75..85),
                rng.gen_range(103.0..105.0),
            ),
            DemoScenario::Abnormal => {
                let hr = if rng.gen_bool(0.5) {
                    rng.gen_range(45..55)
                } else {
                    rng.gen_range(140..160)
                };
                let temp = if rng.gen_bool(0.5) {
                    rng.gen_range(94.0..95.0)
                } else {
                    rng.gen_range(100.5..101.5)
                };
                (
                    hr,
                    rng.gen_range(160..180),
                    rng.gen_range(95..110),
                    rng.gen_range(88..92),
                    temp,
                )
            }
            DemoScenario::Normal => (
                rng.gen_range(60..100),
                rng.gen_range(110..130),
                rng.gen_range(70..85),
                rng.gen_range(95..100),
                rng.gen_range(97.5..99.0),
            ),
        };
        DemoReading {
            scenario: self,
            sample: VitalSample {
                heart_rate_bpm,
                systolic_mmhg,
                diastolic_mmhg,
                spo2_pct,
                temperature_f,
                activity_level: 0.0,
                timestamp: now,
            },
            activity: self.activity(),
            location: demo_location(),
        }
    }
}

/// Sensor source that produces a fresh synthetic reading on every poll.
pub struct DemoSensorSource<R = StdRng> {
    scenario: DemoScenario,
    rng: R,
    started: bool,
}

impl DemoSensorSource<StdRng> {
    pub fn from_entropy(scenario: DemoScenario) -> Self {
        Self::new(scenario, StdRng::from_entropy())
    }
}

impl<R: Rng + Send> DemoSensorSource<R> {
    pub fn new(scenario: DemoScenario, rng: R) -> Self {
        Self {
            scenario,
            rng,
            started: false,
        }
    }
}

impl<R: Rng + Send> SensorSource for DemoSensorSource<R> {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            heart_rate: true,
            direct_blood_pressure: true,
            direct_spo2: true,
            temperature: true,
            location: true,
        }
    }

    fn start(&mut self) -> Result<(), SensorError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn poll(&mut self, now: DateTime<Utc>) -> Result<RawReading, SensorError> {
        if !self.started {
            return Err(SensorError::NotStarted);
        }
        let reading = self.scenario.generate(&mut self.rng, now);
        let sample = reading.sample;
        Ok(RawReading {
            heart_rate_bpm: sample.heart_rate_bpm,
            activity_level: sample.activity_level,
            blood_pressure: Some(BloodPressure::from_parts(
                sample.systolic_mmhg,
                sample.diastolic_mmhg,
            )),
            spo2_pct: Some(sample.spo2_pct),
            ambient_temperature_f: None,
            body_temperature_f: Some(sample.temperature_f),
            location: Some(reading.location),
        })
    }
}
