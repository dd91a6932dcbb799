//! Health monitor: decides what a fired alarm means
//!
//! The three alarms form a cascade. Health checks notice a silent primary,
//! the failover alarm restarts it, and the backup alarm guarantees completion
//! even if failover never got armed. No alarm is trusted on its own: every
//! handler re-derives the expected remaining time from the state manager's
//! wall-clock record before acting, because alarm delivery can be late by an
//! arbitrary amount.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{HealthEventKind, HealthTelemetry};
use crate::{
    alarms::AlarmScheduler,
    clock::Clock,
    config::RedundancyConfig,
    error::AlarmError,
    host::{CompletionSource, TimerHost},
    state::{TimerHealthStatus, TimerStateManager},
};

#[derive(Debug)]
pub struct HealthMonitor {
    state: Arc<TimerStateManager>,
    alarms: Arc<AlarmScheduler>,
    host: Arc<dyn TimerHost>,
    telemetry: Arc<HealthTelemetry>,
    clock: Arc<dyn Clock>,
    config: RedundancyConfig,
}

impl HealthMonitor {
    pub fn new(
        state: Arc<TimerStateManager>,
        alarms: Arc<AlarmScheduler>,
        host: Arc<dyn TimerHost>,
        telemetry: Arc<HealthTelemetry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = *alarms.config();
        Self {
            state,
            alarms,
            host,
            telemetry,
            clock,
            config,
        }
    }

    /// True when the reported and expected remaining times disagree beyond tolerance
    pub fn check_for_drift(&self, current_remaining_ms: u64, expected_remaining_ms: u64) -> bool {
        current_remaining_ms.abs_diff(expected_remaining_ms) > self.config.drift_tolerance_ms
    }

    /// The backup alarm fired.
    ///
    /// Near-zero expected remaining time proves the session is over and the
    /// redundant path completes it. Anything else means the alarm is early or
    /// stale, and it is re-armed for the recomputed remaining time so a
    /// legitimate session is never cut short.
    pub fn handle_backup_alarm_trigger(&self) -> Result<(), AlarmError> {
        let state = self.state.state();
        if !state.is_running() {
            debug!("Backup alarm fired while {}, ignoring", state);
            return Ok(());
        }

        let expected = self.state.expected_remaining_ms();
        if expected <= self.config.completion_tolerance_ms {
            self.complete_from_backup(expected);
            return Ok(());
        }

        info!("Backup alarm fired with {}ms still expected, rescheduling", expected);
        self.telemetry.record(HealthEventKind::PrematureBackup {
            expected_remaining_ms: expected,
        });
        self.guard(self.alarms.schedule_backup_alarm(expected))?;
        Ok(())
    }

    /// The recurring health-check alarm fired
    pub fn handle_health_check_trigger(&self) -> Result<(), AlarmError> {
        let state = self.state.state();
        if !state.is_running() {
            debug!("Health check fired while {}, ignoring", state);
            return Ok(());
        }

        let silent_ms = self.clock.now_ms().saturating_sub(self.state.last_health_check());
        if silent_ms > self.config.failover_timeout_ms {
            warn!("No primary heartbeat for {}ms, arming failover", silent_ms);
            self.state.set_health_status(TimerHealthStatus::PrimaryUnresponsive);
            self.telemetry.record(HealthEventKind::PrimaryUnresponsive { silent_ms });
            self.guard(self.alarms.schedule_failover_alarm())?;
        } else {
            debug!("Primary heartbeat {}ms ago, health check passed", silent_ms);
            self.guard(self.alarms.schedule_health_check())?;
        }
        Ok(())
    }

    /// The failover alarm fired: take over from the primary
    pub fn handle_failover_trigger(&self) -> Result<(), AlarmError> {
        let state = self.state.state();
        if !state.is_running() {
            debug!("Failover alarm fired while {}, ignoring", state);
            return Ok(());
        }

        self.state.set_health_status(TimerHealthStatus::FailoverActivated);

        let remaining = self.state.expected_remaining_ms();
        if remaining == 0 {
            info!("Failover found the session already over, completing via backup path");
            return self.handle_backup_alarm_trigger();
        }

        // Re-anchor the record on the remaining time before the new loop subscribes
        let Some(remaining) = self.state.rebase_running(TimerHealthStatus::FailoverActivated)
        else {
            return Ok(());
        };

        warn!("Failover activated, restarting primary countdown with {}ms remaining", remaining);
        self.telemetry.record(HealthEventKind::FailoverActivated { remaining_ms: remaining });
        self.host.restart_primary(remaining);
        self.telemetry.record(HealthEventKind::PrimaryRestarted { remaining_ms: remaining });
        self.guard(self.alarms.schedule_backup_alarm(remaining))?;
        self.guard(self.alarms.schedule_health_check())?;
        Ok(())
    }

    fn complete_from_backup(&self, expected_remaining_ms: u64) {
        warn!(
            "Backup alarm completing session ({}ms expected remaining)",
            expected_remaining_ms
        );
        self.state.stop_timer();
        self.alarms.cancel_all_alarms();
        self.state.set_health_status(TimerHealthStatus::FailoverActivated);
        self.telemetry
            .record(HealthEventKind::BackupCompletion { expected_remaining_ms });
        self.host.complete_timer(CompletionSource::Backup);
    }

    /// Scheduling failures mean the backup path is gone; record that before
    /// handing the error back.
    fn guard<T>(&self, result: Result<T, AlarmError>) -> Result<T, AlarmError> {
        if let Err(e) = &result {
            self.state.set_health_status(TimerHealthStatus::BackupUnavailable);
            self.telemetry.record(HealthEventKind::AlarmFailure { message: e.to_string() });
        }
        result
    }
}
