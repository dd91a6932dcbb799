//! Alarm kinds

use serde::{Deserialize, Serialize};

/// The three alarms the redundancy subsystem keeps; at most one of each is
/// outstanding at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// Fires after the session should have ended, plus a safety margin
    Backup,
    /// Recurring check that the primary countdown is still heartbeating
    HealthCheck,
    /// Last window for the primary before the redundant path takes over
    Failover,
}

impl AlarmKind {
    pub const ALL: [AlarmKind; 3] =
        [AlarmKind::Backup, AlarmKind::HealthCheck, AlarmKind::Failover];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::Backup => "backup",
            AlarmKind::HealthCheck => "health_check",
            AlarmKind::Failover => "failover",
        }
    }
}

impl std::fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
