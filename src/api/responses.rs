//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    health::TelemetryReport,
    session::CycleType,
    state::{TimerSnapshot, TimerStatus},
    tasks::CountdownProgress,
};

/// Optional body of `POST /start`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    pub cycle: Option<CycleType>,
    pub duration_ms: Option<u64>,
}

/// API response structure for session control endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: TimerStatus,
}

impl ApiResponse {
    pub fn new(status: &str, message: String, timer: TimerStatus) -> Self {
        Self {
            status: status.to_string(),
            message,
            timestamp: Utc::now(),
            timer,
        }
    }

    /// Session is counting down
    pub fn active(message: String, timer: TimerStatus) -> Self {
        Self::new("active", message, timer)
    }

    /// Session is paused or stopped
    pub fn inactive(message: String, timer: TimerStatus) -> Self {
        Self::new("inactive", message, timer)
    }

    pub fn error(message: String, timer: TimerStatus) -> Self {
        Self::new("error", message, timer)
    }
}

/// Status response with timer and server information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: TimerStatus,
    /// The primary loop's own view of the countdown
    pub primary: CountdownProgress,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Raw state record plus the health telemetry log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    pub snapshot: TimerSnapshot,
    pub telemetry: TelemetryReport,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
