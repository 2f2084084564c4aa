use crate::config::{
    Config, ConfigError, Credentials, JsonFilePreferenceStore, MemoryPreferenceStore,
    PreferenceStore,
};
use crate::estimator::{
    blood_pressure_bounds, estimate_blood_pressure, estimate_spo2, estimate_temperature,
    VitalEstimator,
};
use crate::sample::{activity_level_from_accel, ActivityLabel, BloodPressure, VitalSample};
use crate::severity::{assess, classify, Severity};
use chrono::Utc;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn sample(hr: u32, systolic: u32, spo2: u8, temp: f32) -> VitalSample {
    VitalSample {
        heart_rate_bpm: hr,
        systolic_mmhg: systolic,
        diastolic_mmhg: if systolic > 0 { 80 } else { 0 },
        spo2_pct: spo2,
        temperature_f: temp,
        activity_level: 1.0,
        timestamp: Utc::now(),
    }
}

#[test]
fn classify_boundaries_match_band_table() {
    let expected = [
        (0, Severity::Normal),
        (49, Severity::Critical),
        (50, Severity::Abnormal),
        (59, Severity::Abnormal),
        (60, Severity::Normal),
        (130, Severity::Normal),
        (131, Severity::Abnormal),
        (150, Severity::Abnormal),
        (151, Severity::Critical),
        (300, Severity::Critical),
    ];
    for (hr, tier) in expected {
        assert_eq!(classify(hr), tier, "heart rate {hr}");
    }
}

#[test]
fn severity_is_totally_ordered() {
    assert!(Severity::Normal < Severity::Abnormal);
    assert!(Severity::Abnormal < Severity::Critical);
    assert_eq!(Severity::Critical.as_status(), "critical");
}

proptest! {
    #[test]
    fn classify_is_pure_and_banded(hr in 0u32..=300) {
        let tier = classify(hr);
        prop_assert_eq!(tier, classify(hr));
        let expected = if hr == 0 {
            Severity::Normal
        } else if !(50..=150).contains(&hr) {
            Severity::Critical
        } else if !(60..=130).contains(&hr) {
            Severity::Abnormal
        } else {
            Severity::Normal
        };
        prop_assert_eq!(tier, expected);
    }

    #[test]
    fn spo2_estimate_stays_in_table(hr in 1u32..=300, activity in 0.0f32..40.0) {
        let spo2 = estimate_spo2(hr, activity);
        prop_assert!((94..=99).contains(&spo2));
    }
}

/// Heart-rate bands written out independently of the estimator's table:
/// `<50, [50,60), [60,100), [100,120), [120,140), >=140`.
fn expected_band(hr: u32) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
    match hr {
        0..=49 => (100..110, 60..70),
        50..=59 => (105..115, 65..75),
        60..=99 => (112..128, 72..86),
        100..=119 => (115..130, 75..88),
        120..=139 => (125..138, 80..92),
        _ => (135..150, 85..100),
    }
}

fn expected_adjustment(hr: u32, activity: f32) -> (u32, u32) {
    if hr < 120 {
        (0, 0)
    } else if activity > 15.0 {
        (8, 4)
    } else if activity > 10.0 {
        (4, 2)
    } else if activity > 5.0 {
        (2, 1)
    } else {
        (0, 0)
    }
}

fn assert_in_expected_band(hr: u32, activity: f32, systolic: u32, diastolic: u32) {
    let (sys, dia) = expected_band(hr);
    let (sys_adj, dia_adj) = expected_adjustment(hr, activity);
    assert!(
        (sys.start + sys_adj..sys.end + sys_adj).contains(&systolic),
        "hr={hr} act={activity} sys={systolic}"
    );
    assert!(
        (dia.start + dia_adj..dia.end + dia_adj).contains(&diastolic),
        "hr={hr} act={activity} dia={diastolic}"
    );
}

#[test]
fn blood_pressure_estimates_stay_in_band() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..10_000 {
        let hr = rng.gen_range(1..=300);
        let activity = rng.gen_range(0.0f32..30.0);
        match estimate_blood_pressure(&mut rng, hr, activity) {
            BloodPressure::Reading {
                systolic,
                diastolic,
            } => assert_in_expected_band(hr, activity, systolic, diastolic),
            BloodPressure::Unavailable => panic!("hr={hr} must produce a reading"),
        }
    }
}

#[test]
fn every_band_edge_uses_the_right_band() {
    let edges = [1, 49, 50, 59, 60, 99, 100, 119, 120, 139, 140, 300];
    let mut rng = StdRng::seed_from_u64(42);
    for hr in edges {
        let (sys, dia) = expected_band(hr);
        let (mut sys_seen, mut dia_seen) = (Vec::new(), Vec::new());
        for _ in 0..2_000 {
            match estimate_blood_pressure(&mut rng, hr, 0.0) {
                BloodPressure::Reading {
                    systolic,
                    diastolic,
                } => {
                    assert_in_expected_band(hr, 0.0, systolic, diastolic);
                    sys_seen.push(systolic);
                    dia_seen.push(diastolic);
                }
                BloodPressure::Unavailable => panic!("hr={hr} must produce a reading"),
            }
        }
        // The whole band is reachable, not just a slice of it.
        assert_eq!(sys_seen.iter().min(), Some(&sys.start), "hr={hr}");
        assert_eq!(sys_seen.iter().max(), Some(&(sys.end - 1)), "hr={hr}");
        assert_eq!(dia_seen.iter().min(), Some(&dia.start), "hr={hr}");
        assert_eq!(dia_seen.iter().max(), Some(&(dia.end - 1)), "hr={hr}");

        let (sys_bounds, dia_bounds) = blood_pressure_bounds(hr, 0.0);
        assert_eq!(sys_bounds, sys.start..=sys.end - 1, "hr={hr}");
        assert_eq!(dia_bounds, dia.start..=dia.end - 1, "hr={hr}");
    }
}

#[test]
fn activity_steps_at_each_threshold() {
    let mut rng = StdRng::seed_from_u64(9);
    for hr in [119, 120, 139, 140, 300] {
        for activity in [0.0, 5.0, 5.5, 10.0, 10.5, 15.0, 15.5, 29.0] {
            for _ in 0..200 {
                match estimate_blood_pressure(&mut rng, hr, activity) {
                    BloodPressure::Reading {
                        systolic,
                        diastolic,
                    } => assert_in_expected_band(hr, activity, systolic, diastolic),
                    BloodPressure::Unavailable => panic!("hr={hr} must produce a reading"),
                }
            }
        }
    }
}

#[test]
fn activity_adjustment_only_above_120_bpm() {
    let (sys, dia) = blood_pressure_bounds(119, 20.0);
    assert_eq!((*sys.start(), *sys.end()), (115, 129));
    assert_eq!((*dia.start(), *dia.end()), (75, 87));

    let (sys, dia) = blood_pressure_bounds(120, 20.0);
    assert_eq!((*sys.start(), *sys.end()), (133, 145));
    assert_eq!((*dia.start(), *dia.end()), (84, 95));

    let (sys, dia) = blood_pressure_bounds(140, 11.0);
    assert_eq!((*sys.start(), *sys.end()), (139, 153));
    assert_eq!((*dia.start(), *dia.end()), (87, 101));

    let (sys, _) = blood_pressure_bounds(45, 20.0);
    assert_eq!((*sys.start(), *sys.end()), (100, 109));
}

#[test]
fn zero_heart_rate_is_unavailable() {
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(
        estimate_blood_pressure(&mut rng, 0, 12.0),
        BloodPressure::Unavailable
    );
    assert_eq!(estimate_spo2(0, 12.0), 0);
    assert_eq!(estimate_temperature(0, None), 0.0);
    assert_eq!(BloodPressure::Unavailable.to_string(), "--/--");
}

#[test]
fn spo2_table_follows_heart_rate_then_activity() {
    assert_eq!(estimate_spo2(45, 20.0), 94);
    assert_eq!(estimate_spo2(160, 20.0), 96);
    assert_eq!(estimate_spo2(150, 16.0), 97);
    assert_eq!(estimate_spo2(80, 11.0), 98);
    assert_eq!(estimate_spo2(80, 10.0), 99);
}

#[test]
fn estimator_skips_vitals_with_direct_sensors() {
    let mut estimator = VitalEstimator::new(StdRng::seed_from_u64(1));
    let both = estimator.estimate(80, 0.0, false, false);
    assert!(matches!(both.blood_pressure, Some(BloodPressure::Reading { .. })));
    assert_eq!(both.spo2_pct, Some(99));

    let direct = estimator.estimate(80, 0.0, true, true);
    assert_eq!(direct.blood_pressure, None);
    assert_eq!(direct.spo2_pct, None);
}

#[test]
fn temperature_prefers_direct_reading() {
    assert!((estimate_temperature(80, Some(88.0)) - 98.0).abs() < 1e-4);
    assert!((estimate_temperature(120, None) - 99.6).abs() < 1e-4);
    assert!((estimate_temperature(70, Some(0.0)) - 98.6).abs() < 1e-4);
}

#[test]
fn activity_labels_follow_magnitude() {
    assert_eq!(ActivityLabel::from_level(activity_level_from_accel(0.0, 0.0, 1.0)), ActivityLabel::Resting);
    assert_eq!(ActivityLabel::from_level(4.9), ActivityLabel::Light);
    assert_eq!(ActivityLabel::from_level(5.0), ActivityLabel::Moderate);
    assert_eq!(ActivityLabel::from_level(14.9), ActivityLabel::Active);
    assert_eq!(ActivityLabel::HighIntensity.as_str(), "High Intensity");
    assert!((activity_level_from_accel(3.0, 4.0, 0.0) - 5.0).abs() < 1e-6);
}

#[test]
fn assessment_takes_worst_available_vital() {
    let healthy = assess(&sample(72, 120, 98, 98.6));
    assert_eq!(healthy.overall, Severity::Normal);

    let low_oxygen = assess(&sample(72, 120, 93, 98.6));
    assert_eq!(low_oxygen.spo2, Some(Severity::Critical));
    assert_eq!(low_oxygen.overall, Severity::Critical);

    let no_data = assess(&VitalSample::unavailable(Utc::now()));
    assert_eq!(no_data.heart_rate, None);
    assert_eq!(no_data.blood_pressure, None);
    assert_eq!(no_data.overall, Severity::Normal);

    let warm = assess(&sample(72, 135, 0, 99.8));
    assert_eq!(warm.blood_pressure, Some(Severity::Abnormal));
    assert_eq!(warm.temperature, Some(Severity::Abnormal));
    assert_eq!(warm.spo2, None);
}

#[test]
fn negative_cooldown_is_rejected_at_the_store() {
    let store = MemoryPreferenceStore::new(Config::default(), None);
    let err = store.set_cooldown_minutes(-5).unwrap_err();
    assert!(matches!(err, ConfigError::NegativeCooldown(-5)));
    assert_eq!(store.load().unwrap().cooldown_minutes, 15);

    store.set_cooldown_minutes(0).unwrap();
    assert_eq!(store.load().unwrap().cooldown_minutes, 0);
}

#[test]
fn api_base_resolves_hosts_and_urls() {
    let mut config = Config::default();
    assert_eq!(config.api_base(), "http://192.168.1.100:5000");
    config.server_endpoint = "10.0.0.2".into();
    assert_eq!(config.api_base(), "http://10.0.0.2:5000");
    config.server_endpoint = "https://health.example.org/".into();
    assert_eq!(config.api_base(), "https://health.example.org");
    config.server_endpoint = "  ".into();
    assert_eq!(config.api_base(), "http://192.168.1.100:5000");
}

#[test]
fn credentials_require_id_and_token() {
    let store = MemoryPreferenceStore::new(
        Config::default(),
        Some(Credentials {
            user_id: 4,
            token: "   ".into(),
        }),
    );
    assert_eq!(store.credentials().unwrap(), None);

    let creds = Credentials {
        user_id: 4,
        token: "abc".into(),
    };
    store.store_credentials(Some(&creds)).unwrap();
    assert_eq!(store.credentials().unwrap(), Some(creds));
}

fn scratch_path(name: &str) -> std::path::PathBuf {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!("wristbud-{name}-{}-{nanos}.json", std::process::id()))
}

#[test]
fn json_store_fills_defaults_and_clamps_negative_cooldown() {
    let path = scratch_path("clamp");
    std::fs::write(&path, br#"{"prompt_cooldown": -3, "context_tag": "Sleep"}"#).unwrap();
    let store = JsonFilePreferenceStore::new(&path);
    let config = store.load().unwrap();
    assert_eq!(config.cooldown_minutes, 0);
    assert_eq!(config.context_tag, "Sleep");
    assert!(config.monitoring_enabled);
    std::fs::remove_file(&path).ok();
}

#[test]
fn json_store_persists_config_and_credentials() {
    let path = scratch_path("persist");
    let store = JsonFilePreferenceStore::new(&path);
    assert_eq!(store.load().unwrap(), Config::default());

    let config = Config {
        prompting_enabled: false,
        cooldown_minutes: 3,
        server_endpoint: "10.1.1.1".into(),
        ..Config::default()
    };
    store.store(&config).unwrap();
    store
        .store_credentials(Some(&Credentials {
            user_id: 9,
            token: "tok".into(),
        }))
        .unwrap();

    let reopened = JsonFilePreferenceStore::new(&path);
    assert_eq!(reopened.load().unwrap(), config);
    assert_eq!(reopened.credentials().unwrap().map(|c| c.user_id), Some(9));
    std::fs::remove_file(&path).ok();
}
