//! Timer health module
//!
//! `monitor` decides what to do when alarms fire; `telemetry` keeps a record
//! of what happened for diagnostics.

pub mod monitor;
pub mod telemetry;

// Re-export main types
pub use monitor::HealthMonitor;
pub use telemetry::{
    HealthEvent, HealthEventKind, HealthTelemetry, TelemetryCounters, TelemetryReport,
};
