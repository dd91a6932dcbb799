//! Health telemetry: an observational log of drift, stalls and failovers
//!
//! Nothing here feeds back into timing decisions.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::HeartbeatOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthEventKind {
    DriftDetected { drift_ms: u64 },
    DriftCleared { drift_ms: u64 },
    PrimaryUnresponsive { silent_ms: u64 },
    FailoverActivated { remaining_ms: u64 },
    PrimaryRestarted { remaining_ms: u64 },
    PrematureBackup { expected_remaining_ms: u64 },
    BackupCompletion { expected_remaining_ms: u64 },
    AlarmFailure { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: HealthEventKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryCounters {
    pub drift_events: u64,
    pub max_drift_ms: u64,
    pub unresponsive_events: u64,
    pub failovers: u64,
    pub primary_restarts: u64,
    pub premature_backups: u64,
    pub backup_completions: u64,
    pub alarm_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub counters: TelemetryCounters,
    /// Most recent events, oldest first
    pub recent: Vec<HealthEvent>,
}

#[derive(Debug, Default)]
struct Log {
    events: VecDeque<HealthEvent>,
    counters: TelemetryCounters,
}

/// Bounded event log with running counters
#[derive(Debug)]
pub struct HealthTelemetry {
    capacity: usize,
    log: Mutex<Log>,
}

impl HealthTelemetry {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: Mutex::new(Log::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, kind: HealthEventKind) {
        debug!("Health event: {:?}", kind);
        let mut log = self.lock();

        let counters = &mut log.counters;
        match &kind {
            HealthEventKind::DriftDetected { drift_ms } => {
                counters.drift_events += 1;
                counters.max_drift_ms = counters.max_drift_ms.max(*drift_ms);
            }
            HealthEventKind::DriftCleared { .. } => {}
            HealthEventKind::PrimaryUnresponsive { .. } => counters.unresponsive_events += 1,
            HealthEventKind::FailoverActivated { .. } => counters.failovers += 1,
            HealthEventKind::PrimaryRestarted { .. } => counters.primary_restarts += 1,
            HealthEventKind::PrematureBackup { .. } => counters.premature_backups += 1,
            HealthEventKind::BackupCompletion { .. } => counters.backup_completions += 1,
            HealthEventKind::AlarmFailure { .. } => counters.alarm_failures += 1,
        }

        if log.events.len() == self.capacity {
            log.events.pop_front();
        }
        log.events.push_back(HealthEvent { at: Utc::now(), kind });
    }

    /// Record the interesting heartbeat outcomes; healthy beats are not logged
    pub fn record_heartbeat(&self, outcome: HeartbeatOutcome) {
        match outcome {
            HeartbeatOutcome::DriftDetected { drift_ms } => {
                self.record(HealthEventKind::DriftDetected { drift_ms })
            }
            HeartbeatOutcome::DriftCleared { drift_ms } => {
                self.record(HealthEventKind::DriftCleared { drift_ms })
            }
            HeartbeatOutcome::Healthy { .. } | HeartbeatOutcome::Ignored => {}
        }
    }

    pub fn counters(&self) -> TelemetryCounters {
        self.lock().counters
    }

    pub fn report(&self) -> TelemetryReport {
        let log = self.lock();
        TelemetryReport {
            counters: log.counters,
            recent: log.events.iter().cloned().collect(),
        }
    }
}

impl Default for HealthTelemetry {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
