pub mod dispatcher;
pub mod notifier;
pub mod payload;
#[cfg(test)]
mod tests;

pub use dispatcher::{DispatchContext, DispatchOutcome, TelemetryDispatcher};
pub use notifier::{DispatchError, HttpNotifier, MemoryNotifier, Notifier};
pub use payload::{
    DemoRequest, DemoResponse, DemoVitals, EmergencyPayload, LoginRequest, LoginResponse,
    SnapshotPayload,
};
pub use prometheus_bridge::DispatchKind;
