//! Sampling loop that ties sensors, estimation, escalation and telemetry together.

pub mod demo;
pub mod monitor;
pub mod sensor;

pub use demo::{demo_location, DemoReading, DemoScenario, DemoSensorSource, UnknownScenario};
pub use monitor::{Monitor, MonitorError, MonitorTick, MIN_SAMPLE_PERIOD, SAMPLE_PERIOD};
pub use sensor::{
    Capabilities, LatchedSensorSource, RawReading, ScriptedSensorSource, SensorError, SensorEvent,
    SensorSource, HEART_RATE_STALE_AFTER_SECS,
};
