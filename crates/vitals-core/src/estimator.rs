//! Banded vital-sign heuristics for a wrist device that only measures heart
//! rate and motion. These are proxies, not clinical estimates: the band
//! table and activity adjustment are fixed, the draw inside a band is random.

use crate::sample::BloodPressure;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::{Range, RangeInclusive};

/// Offset applied to the wrist's ambient temperature reading to approximate body temperature.
pub const AMBIENT_TO_BODY_OFFSET_F: f32 = 10.0;
pub const RESTING_BODY_TEMPERATURE_F: f32 = 98.6;
/// Heart rate at or above which activity nudges the blood-pressure estimate.
pub const ACTIVITY_ADJUSTED_HEART_RATE: u32 = 120;

struct BpBand {
    /// Exclusive upper heart-rate bound; `None` for the open-ended top band.
    below: Option<u32>,
    systolic: Range<u32>,
    diastolic: Range<u32>,
}

static BP_BANDS: [BpBand; 6] = [
    BpBand {
        below: Some(50),
        systolic: 100..110,
        diastolic: 60..70,
    },
    BpBand {
        below: Some(60),
        systolic: 105..115,
        diastolic: 65..75,
    },
    BpBand {
        below: Some(100),
        systolic: 112..128,
        diastolic: 72..86,
    },
    BpBand {
        below: Some(120),
        systolic: 115..130,
        diastolic: 75..88,
    },
    BpBand {
        below: Some(140),
        systolic: 125..138,
        diastolic: 80..92,
    },
    BpBand {
        below: None,
        systolic: 135..150,
        diastolic: 85..100,
    },
];

fn band_for(heart_rate: u32) -> &'static BpBand {
    BP_BANDS
        .iter()
        .find(|band| band.below.map_or(true, |upper| heart_rate < upper))
        .unwrap_or(&BP_BANDS[BP_BANDS.len() - 1])
}

/// Systolic bump for elevated heart rate under motion; diastolic gets half.
pub fn activity_adjustment(activity_level: f32) -> u32 {
    if activity_level > 15.0 {
        8
    } else if activity_level > 10.0 {
        4
    } else if activity_level > 5.0 {
        2
    } else {
        0
    }
}

/// Inclusive systolic/diastolic bounds any estimate for these inputs falls in.
pub fn blood_pressure_bounds(
    heart_rate: u32,
    activity_level: f32,
) -> (RangeInclusive<u32>, RangeInclusive<u32>) {
    let band = band_for(heart_rate);
    let adj = if heart_rate >= ACTIVITY_ADJUSTED_HEART_RATE {
        activity_adjustment(activity_level)
    } else {
        0
    };
    (
        band.systolic.start + adj..=band.systolic.end - 1 + adj,
        band.diastolic.start + adj / 2..=band.diastolic.end - 1 + adj / 2,
    )
}

pub fn estimate_blood_pressure<R: Rng + ?Sized>(
    rng: &mut R,
    heart_rate: u32,
    activity_level: f32,
) -> BloodPressure {
    if heart_rate == 0 {
        return BloodPressure::Unavailable;
    }
    let band = band_for(heart_rate);
    let mut systolic = rng.gen_range(band.systolic.clone());
    let mut diastolic = rng.gen_range(band.diastolic.clone());
    if heart_rate >= ACTIVITY_ADJUSTED_HEART_RATE {
        let adj = activity_adjustment(activity_level);
        systolic += adj;
        diastolic += adj / 2;
    }
    BloodPressure::Reading {
        systolic,
        diastolic,
    }
}

pub fn estimate_spo2(heart_rate: u32, activity_level: f32) -> u8 {
    if heart_rate == 0 {
        0
    } else if heart_rate < 50 {
        94
    } else if heart_rate > 150 {
        96
    } else if activity_level > 15.0 {
        97
    } else if activity_level > 10.0 {
        98
    } else {
        99
    }
}

/// A positive direct reading wins; otherwise temperature is extrapolated from heart rate.
pub fn estimate_temperature(heart_rate: u32, direct_reading_f: Option<f32>) -> f32 {
    match direct_reading_f {
        Some(t) if t > 0.0 => t + AMBIENT_TO_BODY_OFFSET_F,
        _ if heart_rate == 0 => 0.0,
        _ => RESTING_BODY_TEMPERATURE_F + (heart_rate as f32 - 70.0) * 0.02,
    }
}

/// Output of one estimator call. `None` means a direct sensor covers that vital.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalEstimate {
    pub blood_pressure: Option<BloodPressure>,
    pub spo2_pct: Option<u8>,
}

pub struct VitalEstimator<R> {
    rng: R,
}

impl VitalEstimator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> VitalEstimator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn estimate(
        &mut self,
        heart_rate: u32,
        activity_level: f32,
        has_direct_bp: bool,
        has_direct_spo2: bool,
    ) -> VitalEstimate {
        let blood_pressure = (!has_direct_bp)
            .then(|| estimate_blood_pressure(&mut self.rng, heart_rate, activity_level));
        let spo2_pct = (!has_direct_spo2).then(|| estimate_spo2(heart_rate, activity_level));
        VitalEstimate {
            blood_pressure,
            spo2_pct,
        }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}
