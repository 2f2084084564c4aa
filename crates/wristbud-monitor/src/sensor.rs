use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;
use vitals_core::{activity_level_from_accel, BloodPressure, Location};

/// A heart-rate value older than this is treated as no signal.
pub const HEART_RATE_STALE_AFTER_SECS: i64 = 30;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SensorError {
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
    #[error("sensor source has not been started")]
    NotStarted,
    #[error("sensor backend failed: {0}")]
    Backend(String),
}

/// What a source can measure directly. Anything missing is estimated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub heart_rate: bool,
    pub direct_blood_pressure: bool,
    pub direct_spo2: bool,
    pub temperature: bool,
    pub location: bool,
}

/// One poll worth of sensor output, before estimation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub heart_rate_bpm: u32,
    pub activity_level: f32,
    pub blood_pressure: Option<BloodPressure>,
    pub spo2_pct: Option<u8>,
    /// Wrist-surface reading in °F; body temperature is derived from it.
    pub ambient_temperature_f: Option<f32>,
    /// Already a body temperature, used as-is.
    pub body_temperature_f: Option<f32>,
    pub location: Option<Location>,
}

pub trait SensorSource: Send {
    fn capabilities(&self) -> Capabilities;
    fn start(&mut self) -> Result<(), SensorError>;
    /// Idempotent.
    fn stop(&mut self);
    fn poll(&mut self, now: DateTime<Utc>) -> Result<RawReading, SensorError>;
}

/// Push-style events as delivered by a platform sensor callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    HeartRate(f32),
    Accelerometer { x: f32, y: f32, z: f32 },
    AmbientTemperatureC(f32),
    Spo2(u8),
    BloodPressure { systolic: u32, diastolic: u32 },
    Location(Location),
}

#[derive(Debug, Default)]
struct Latch {
    started: bool,
    heart_rate: Option<(u32, DateTime<Utc>)>,
    activity_level: f32,
    ambient_temperature_f: Option<f32>,
    spo2_pct: Option<u8>,
    blood_pressure: Option<BloodPressure>,
    location: Option<Location>,
}

/// Keeps the latest value of every event and serves it on poll. Clones share
/// state, so one clone can feed events while the monitor polls another.
#[derive(Debug, Clone)]
pub struct LatchedSensorSource {
    capabilities: Capabilities,
    latch: Arc<Mutex<Latch>>,
}

impl LatchedSensorSource {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            latch: Arc::new(Mutex::new(Latch::default())),
        }
    }

    pub fn ingest(&self, event: SensorEvent, at: DateTime<Utc>) {
        let Ok(mut latch) = self.latch.lock() else {
            return;
        };
        match event {
            SensorEvent::HeartRate(bpm) => {
                let bpm = bpm.max(0.0) as u32;
                debug!(heart_rate = bpm, "heart rate updated");
                latch.heart_rate = Some((bpm, at));
            }
            SensorEvent::Accelerometer { x, y, z } => {
                latch.activity_level = activity_level_from_accel(x, y, z);
            }
            SensorEvent::AmbientTemperatureC(c) => {
                latch.ambient_temperature_f = Some(c * 9.0 / 5.0 + 32.0);
            }
            SensorEvent::Spo2(pct) => latch.spo2_pct = Some(pct.min(100)),
            SensorEvent::BloodPressure {
                systolic,
                diastolic,
            } => latch.blood_pressure = Some(BloodPressure::from_parts(systolic, diastolic)),
            SensorEvent::Location(location) => latch.location = Some(location),
        }
    }
}

impl SensorSource for LatchedSensorSource {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn start(&mut self) -> Result<(), SensorError> {
        let mut latch = self
            .latch
            .lock()
            .map_err(|_| SensorError::Backend("sensor latch poisoned".into()))?;
        latch.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut latch) = self.latch.lock() {
            latch.started = false;
        }
    }

    fn poll(&mut self, now: DateTime<Utc>) -> Result<RawReading, SensorError> {
        let latch = self
            .latch
            .lock()
            .map_err(|_| SensorError::Backend("sensor latch poisoned".into()))?;
        if !latch.started {
            return Err(SensorError::NotStarted);
        }
        let heart_rate_bpm = match latch.heart_rate {
            Some((bpm, at)) if bpm > 0 && now - at < Duration::seconds(HEART_RATE_STALE_AFTER_SECS) => bpm,
            Some(_) => return Err(SensorError::Unavailable("heart rate is stale".into())),
            None => return Err(SensorError::Unavailable("no heart rate yet".into())),
        };
        Ok(RawReading {
            heart_rate_bpm,
            activity_level: latch.activity_level,
            blood_pressure: latch
                .blood_pressure
                .filter(|_| self.capabilities.direct_blood_pressure),
            spo2_pct: latch.spo2_pct.filter(|_| self.capabilities.direct_spo2),
            ambient_temperature_f: latch.ambient_temperature_f,
            body_temperature_f: None,
            location: latch.location.clone(),
        })
    }
}

/// Replays a fixed sequence of poll results, then reports unavailable.
#[derive(Debug, Default)]
pub struct ScriptedSensorSource {
    script: VecDeque<Result<RawReading, SensorError>>,
    started: bool,
}

impl ScriptedSensorSource {
    pub fn new(script: impl IntoIterator<Item = Result<RawReading, SensorError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            started: false,
        }
    }

    /// A heart rate of 0 becomes an unavailable poll.
    pub fn from_heart_rates(rates: impl IntoIterator<Item = u32>) -> Self {
        Self::new(rates.into_iter().map(|bpm| {
            if bpm == 0 {
                Err(SensorError::Unavailable("scripted gap".into()))
            } else {
                Ok(RawReading {
                    heart_rate_bpm: bpm,
                    ..RawReading::default()
                })
            }
        }))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl SensorSource for ScriptedSensorSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            heart_rate: true,
            ..Capabilities::default()
        }
    }

    fn start(&mut self) -> Result<(), SensorError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn poll(&mut self, _now: DateTime<Utc>) -> Result<RawReading, SensorError> {
        if !self.started {
            return Err(SensorError::NotStarted);
        }
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(SensorError::Unavailable("script exhausted".into())))
    }
}
