//! Alarm scheduler for the backup, health-check and failover alarms

use std::sync::Arc;

use tracing::{debug, error};

use super::{AlarmBackend, AlarmKind};
use crate::{clock::Clock, config::RedundancyConfig, error::AlarmError};

/// Computes trigger times and arms alarms on the backend.
///
/// Every schedule call cancels the pending alarm of its own kind first, so at
/// most one alarm per kind is ever outstanding. Backend failures are returned
/// to the caller unchanged.
#[derive(Debug)]
pub struct AlarmScheduler {
    backend: Arc<dyn AlarmBackend>,
    clock: Arc<dyn Clock>,
    config: RedundancyConfig,
}

impl AlarmScheduler {
    pub fn new(
        backend: Arc<dyn AlarmBackend>,
        clock: Arc<dyn Clock>,
        config: RedundancyConfig,
    ) -> Self {
        Self { backend, clock, config }
    }

    pub fn config(&self) -> &RedundancyConfig {
        &self.config
    }

    fn schedule_in(&self, kind: AlarmKind, delay_ms: Option<u64>) -> Result<u64, AlarmError> {
        self.backend.cancel(kind);

        let trigger_at_ms = delay_ms
            .and_then(|delay| self.clock.now_ms().checked_add(delay))
            .ok_or(AlarmError::TriggerOverflow { kind })?;

        if let Err(e) = self.backend.set_exact(kind, trigger_at_ms) {
            error!("Failed to schedule {} alarm: {}", kind, e);
            return Err(e);
        }

        debug!("Scheduled {} alarm at {}", kind, trigger_at_ms);
        Ok(trigger_at_ms)
    }

    /// Arm the backup completion alarm for `duration_ms` plus the safety
    /// margin, so it fires only after the primary should have finished.
    /// Returns the trigger time.
    pub fn schedule_backup_alarm(&self, duration_ms: u64) -> Result<u64, AlarmError> {
        let delay = duration_ms.checked_add(self.config.safety_margin_ms);
        self.schedule_in(AlarmKind::Backup, delay)
    }

    pub fn schedule_health_check(&self) -> Result<u64, AlarmError> {
        self.schedule_in(AlarmKind::HealthCheck, Some(self.config.health_check_interval_ms))
    }

    pub fn schedule_failover_alarm(&self) -> Result<u64, AlarmError> {
        self.schedule_in(AlarmKind::Failover, Some(self.config.failover_timeout_ms))
    }

    pub fn cancel_backup_alarm(&self) {
        self.backend.cancel(AlarmKind::Backup);
    }

    pub fn cancel_health_check(&self) {
        self.backend.cancel(AlarmKind::HealthCheck);
    }

    pub fn cancel_failover_alarm(&self) {
        self.backend.cancel(AlarmKind::Failover);
    }

    pub fn cancel_all_alarms(&self) {
        for kind in AlarmKind::ALL {
            self.backend.cancel(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alarms::RecordingAlarmBackend, clock::ManualClock};

    fn scheduler() -> (ManualClock, Arc<RecordingAlarmBackend>, AlarmScheduler) {
        let clock = ManualClock::new(100_000);
        let backend = Arc::new(RecordingAlarmBackend::new());
        let scheduler = AlarmScheduler::new(
            backend.clone(),
            Arc::new(clock.clone()),
            RedundancyConfig::default(),
        );
        (clock, backend, scheduler)
    }

    #[test]
    fn backup_fires_after_duration_plus_margin() {
        let (_clock, backend, scheduler) = scheduler();
        let trigger = scheduler.schedule_backup_alarm(60_000).unwrap();
        assert_eq!(trigger, 165_000);
        assert_eq!(backend.trigger_time(AlarmKind::Backup), Some(165_000));
    }

    #[test]
    fn health_check_and_failover_use_fixed_delays() {
        let (clock, backend, scheduler) = scheduler();
        scheduler.schedule_health_check().unwrap();
        clock.advance(1_000);
        scheduler.schedule_failover_alarm().unwrap();

        assert_eq!(backend.trigger_time(AlarmKind::HealthCheck), Some(115_000));
        assert_eq!(backend.trigger_time(AlarmKind::Failover), Some(106_000));
    }

    #[test]
    fn rescheduling_keeps_one_alarm_per_kind() {
        let (clock, backend, scheduler) = scheduler();
        scheduler.schedule_health_check().unwrap();
        clock.advance(15_000);
        scheduler.schedule_health_check().unwrap();

        assert_eq!(backend.pending_kinds(), vec![AlarmKind::HealthCheck]);
        assert_eq!(backend.trigger_time(AlarmKind::HealthCheck), Some(130_000));
        assert_eq!(backend.schedule_count(AlarmKind::HealthCheck), 2);
    }

    #[test]
    fn cancel_all_clears_every_kind() {
        let (_clock, backend, scheduler) = scheduler();
        scheduler.schedule_backup_alarm(1_000).unwrap();
        scheduler.schedule_health_check().unwrap();
        scheduler.schedule_failover_alarm().unwrap();
        assert_eq!(backend.pending_kinds().len(), 3);

        scheduler.cancel_all_alarms();
        assert!(backend.pending_kinds().is_empty());
    }

    #[test]
    fn individual_cancels_leave_other_kinds() {
        let (_clock, backend, scheduler) = scheduler();
        scheduler.schedule_backup_alarm(1_000).unwrap();
        scheduler.schedule_health_check().unwrap();
        scheduler.schedule_failover_alarm().unwrap();

        scheduler.cancel_failover_alarm();
        scheduler.cancel_backup_alarm();
        assert_eq!(backend.pending_kinds(), vec![AlarmKind::HealthCheck]);
        scheduler.cancel_health_check();
        assert!(backend.pending_kinds().is_empty());
    }

    #[test]
    fn denied_exact_alarms_surface_as_errors() {
        let (_clock, backend, scheduler) = scheduler();
        scheduler.schedule_health_check().unwrap();
        backend.deny_exact_alarms(true);

        let err = scheduler.schedule_health_check().unwrap_err();
        assert!(matches!(
            err,
            AlarmError::ExactAlarmUnavailable { kind: AlarmKind::HealthCheck, .. }
        ));
        // The old alarm was cancelled before the failed attempt
        assert!(!backend.is_pending(AlarmKind::HealthCheck));
    }

    #[test]
    fn overflowing_trigger_is_rejected() {
        let (_clock, backend, scheduler) = scheduler();
        let err = scheduler.schedule_backup_alarm(u64::MAX - 1).unwrap_err();
        assert_eq!(err, AlarmError::TriggerOverflow { kind: AlarmKind::Backup });
        assert!(backend.pending_kinds().is_empty());
    }
}
