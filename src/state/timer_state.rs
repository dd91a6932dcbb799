//! Timer state and health status types

use serde::{Deserialize, Serialize};

/// Lifecycle of the single active countdown.
///
/// Valid transitions: `Stopped -> Running` (start), `Running -> Paused`
/// (pause), `Paused -> Running` (resume), `Running | Paused -> Stopped`
/// (stop or completion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimerRedundancyState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl TimerRedundancyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerRedundancyState::Stopped => "stopped",
            TimerRedundancyState::Running => "running",
            TimerRedundancyState::Paused => "paused",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TimerRedundancyState::Running)
    }
}

impl std::fmt::Display for TimerRedundancyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far the primary countdown loop can currently be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimerHealthStatus {
    #[default]
    Healthy,
    /// Heartbeats disagree with the wall clock beyond tolerance
    DriftDetected,
    /// No heartbeat within the failover timeout
    PrimaryUnresponsive,
    /// The redundant path took over (restart or backup completion)
    FailoverActivated,
    /// Exact alarms could not be scheduled
    BackupUnavailable,
}

impl TimerHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerHealthStatus::Healthy => "healthy",
            TimerHealthStatus::DriftDetected => "drift_detected",
            TimerHealthStatus::PrimaryUnresponsive => "primary_unresponsive",
            TimerHealthStatus::FailoverActivated => "failover_activated",
            TimerHealthStatus::BackupUnavailable => "backup_unavailable",
        }
    }
}

impl std::fmt::Display for TimerHealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a primary heartbeat did to the health status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Timer was not running; nothing recorded
    Ignored,
    /// Within tolerance
    Healthy { drift_ms: u64 },
    /// Beyond tolerance; timing base was re-anchored to the heartbeat
    DriftDetected { drift_ms: u64 },
    /// Back within tolerance after a drift episode
    DriftCleared { drift_ms: u64 },
}

/// Point-in-time copy of the countdown record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub state: TimerRedundancyState,
    pub health: TimerHealthStatus,
    pub start_time_epoch_ms: u64,
    pub duration_ms: u64,
    pub expected_remaining_ms: u64,
    pub last_health_check_epoch_ms: u64,
    pub primary_timer_alive: bool,
}
