//! Timer redundancy manager
//!
//! Keeps the state machine and the alarm lifecycle in lockstep: every
//! operation that changes one changes the other, so there is never a running
//! timer without its alarms or a pending alarm for a stopped timer.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::{
    alarms::{AlarmDispatcher, AlarmHandler, AlarmKind, AlarmScheduler},
    error::AlarmError,
    health::{HealthEventKind, HealthMonitor, HealthTelemetry},
    state::{
        HeartbeatOutcome, TimerHealthStatus, TimerRedundancyState, TimerSnapshot, TimerStateManager,
    },
};

#[derive(Debug)]
pub struct TimerRedundancyManager {
    state: Arc<TimerStateManager>,
    alarms: Arc<AlarmScheduler>,
    monitor: HealthMonitor,
    telemetry: Arc<HealthTelemetry>,
}

impl TimerRedundancyManager {
    pub fn new(
        state: Arc<TimerStateManager>,
        alarms: Arc<AlarmScheduler>,
        monitor: HealthMonitor,
        telemetry: Arc<HealthTelemetry>,
    ) -> Self {
        Self {
            state,
            alarms,
            monitor,
            telemetry,
        }
    }

    /// Route every alarm kind delivered through `dispatcher` to this manager
    pub fn register_alarm_handler(self: &Arc<Self>, dispatcher: &AlarmDispatcher) {
        dispatcher.register_all(self);
    }

    /// Start a fresh session of `duration_ms` with both timing sources armed.
    ///
    /// If the alarms cannot be armed the session is stopped again and the
    /// error returned.
    pub fn start_timer(&self, duration_ms: u64) -> Result<(), AlarmError> {
        self.alarms.cancel_all_alarms();
        self.state.start_timer(duration_ms);

        if let Err(e) = self.arm(duration_ms) {
            self.abandon(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Pause and return the remaining time; alarms are pointless while paused
    pub fn pause_timer(&self) -> u64 {
        let remaining = self.state.pause_timer();
        self.alarms.cancel_all_alarms();
        remaining
    }

    /// Resume a paused session with `remaining_ms` left
    pub fn resume_timer(&self, remaining_ms: u64) -> Result<(), AlarmError> {
        self.state.resume_timer(remaining_ms);
        if !self.state.state().is_running() {
            return Ok(());
        }

        if let Err(e) = self.arm(remaining_ms) {
            self.abandon(&e);
            return Err(e);
        }
        Ok(())
    }

    pub fn stop_timer(&self) {
        self.state.stop_timer();
        self.alarms.cancel_all_alarms();
    }

    fn arm(&self, duration_ms: u64) -> Result<(), AlarmError> {
        self.alarms.schedule_backup_alarm(duration_ms)?;
        self.alarms.schedule_health_check()?;
        Ok(())
    }

    fn abandon(&self, e: &AlarmError) {
        error!("Redundant timing unavailable, stopping session: {}", e);
        self.stop_timer();
        self.state.set_health_status(TimerHealthStatus::BackupUnavailable);
        self.telemetry.record(HealthEventKind::AlarmFailure { message: e.to_string() });
    }

    pub fn report_primary_timer_heartbeat(&self, current_remaining_ms: u64) -> HeartbeatOutcome {
        let outcome = self.state.report_primary_timer_heartbeat(current_remaining_ms);
        self.telemetry.record_heartbeat(outcome);
        outcome
    }

    pub fn handle_backup_alarm_trigger(&self) -> Result<(), AlarmError> {
        self.monitor.handle_backup_alarm_trigger()
    }

    pub fn handle_health_check_trigger(&self) -> Result<(), AlarmError> {
        self.monitor.handle_health_check_trigger()
    }

    pub fn handle_failover_trigger(&self) -> Result<(), AlarmError> {
        self.monitor.handle_failover_trigger()
    }

    pub fn timer_state(&self) -> TimerRedundancyState {
        self.state.state()
    }

    pub fn health_status(&self) -> TimerHealthStatus {
        self.state.health_status()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TimerRedundancyState> {
        self.state.subscribe_state()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<TimerHealthStatus> {
        self.state.subscribe_health()
    }

    pub fn state_manager(&self) -> &Arc<TimerStateManager> {
        &self.state
    }

    pub fn telemetry(&self) -> &Arc<HealthTelemetry> {
        &self.telemetry
    }
}

impl AlarmHandler for TimerRedundancyManager {
    fn on_alarm(&self, kind: AlarmKind) -> Result<(), AlarmError> {
        info!("{} alarm fired while {}", kind, self.timer_state());
        match kind {
            AlarmKind::Backup => self.handle_backup_alarm_trigger(),
            AlarmKind::HealthCheck => self.handle_health_check_trigger(),
            AlarmKind::Failover => self.handle_failover_trigger(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarms::{AlarmBackend, RecordingAlarmBackend, TokioAlarmBackend},
        clock::{Clock, ManualClock},
        config::RedundancyConfig,
        host::{CompletionSource, TimerHost},
    };
    use std::{sync::Mutex, time::Duration};

    #[derive(Debug, Default)]
    struct FakeHost {
        completions: Mutex<Vec<CompletionSource>>,
        restarts: Mutex<Vec<u64>>,
    }

    impl TimerHost for FakeHost {
        fn complete_timer(&self, source: CompletionSource) {
            self.completions.lock().unwrap().push(source);
        }

        fn restart_primary(&self, remaining_ms: u64) {
            self.restarts.lock().unwrap().push(remaining_ms);
        }
    }

    fn build(
        clock: &ManualClock,
        backend: Arc<dyn AlarmBackend>,
    ) -> (Arc<FakeHost>, TimerRedundancyManager) {
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let config = RedundancyConfig::default();
        let state = Arc::new(TimerStateManager::new(
            shared_clock.clone(),
            config.drift_tolerance_ms,
        ));
        let alarms = Arc::new(AlarmScheduler::new(backend, shared_clock.clone(), config));
        let telemetry = Arc::new(HealthTelemetry::default());
        let host = Arc::new(FakeHost::default());
        let monitor = HealthMonitor::new(
            state.clone(),
            alarms.clone(),
            host.clone(),
            telemetry.clone(),
            shared_clock,
        );
        (host, TimerRedundancyManager::new(state, alarms, monitor, telemetry))
    }

    fn recording() -> (
        ManualClock,
        Arc<RecordingAlarmBackend>,
        Arc<FakeHost>,
        TimerRedundancyManager,
    ) {
        let clock = ManualClock::new(1_700_000_000_000);
        let backend = Arc::new(RecordingAlarmBackend::new());
        let (host, manager) = build(&clock, backend.clone());
        (clock, backend, host, manager)
    }

    #[test]
    fn work_session_pause_resume_stop() {
        let (clock, backend, _host, manager) = recording();

        manager.start_timer(1_500_000).unwrap();
        assert_eq!(backend.pending_kinds(), vec![AlarmKind::Backup, AlarmKind::HealthCheck]);

        clock.advance(5_000);
        let remaining = manager.pause_timer();
        assert!(remaining.abs_diff(1_495_000) <= 100);
        assert!(backend.pending_kinds().is_empty());

        manager.resume_timer(1_495_000).unwrap();
        assert_eq!(manager.timer_state(), TimerRedundancyState::Running);
        assert_eq!(
            backend.trigger_time(AlarmKind::Backup),
            Some(clock.now_ms() + 1_495_000 + 5_000)
        );

        manager.stop_timer();
        assert_eq!(manager.timer_state(), TimerRedundancyState::Stopped);
        assert_eq!(manager.health_status(), TimerHealthStatus::Healthy);
        assert!(backend.pending_kinds().is_empty());
    }

    #[test]
    fn start_rolls_back_when_alarms_are_denied() {
        let (_clock, backend, _host, manager) = recording();
        backend.deny_exact_alarms(true);

        let err = manager.start_timer(60_000).unwrap_err();
        assert!(matches!(err, AlarmError::ExactAlarmUnavailable { .. }));
        assert_eq!(manager.timer_state(), TimerRedundancyState::Stopped);
        assert_eq!(manager.health_status(), TimerHealthStatus::BackupUnavailable);
        assert_eq!(manager.telemetry().counters().alarm_failures, 1);
    }

    #[test]
    fn resume_without_pause_arms_nothing() {
        let (_clock, backend, _host, manager) = recording();
        manager.resume_timer(30_000).unwrap();
        assert_eq!(manager.timer_state(), TimerRedundancyState::Stopped);
        assert!(backend.pending_kinds().is_empty());
    }

    #[test]
    fn triggers_after_cancel_all_are_safe_when_stopped() {
        let (_clock, backend, host, manager) = recording();
        manager.start_timer(60_000).unwrap();
        manager.stop_timer();

        for kind in AlarmKind::ALL {
            manager.on_alarm(kind).unwrap();
        }
        assert_eq!(manager.timer_state(), TimerRedundancyState::Stopped);
        assert!(backend.pending_kinds().is_empty());
        assert!(host.completions.lock().unwrap().is_empty());
    }

    #[test]
    fn heartbeat_drift_is_recorded_in_telemetry() {
        let (clock, _backend, _host, manager) = recording();
        manager.start_timer(300_000).unwrap();
        clock.advance(3_100);

        let outcome = manager.report_primary_timer_heartbeat(300_000);
        assert_eq!(outcome, HeartbeatOutcome::DriftDetected { drift_ms: 3_100 });
        assert_eq!(manager.health_status(), TimerHealthStatus::DriftDetected);
        assert_eq!(manager.telemetry().counters().drift_events, 1);
    }

    #[test]
    fn stalled_primary_cascades_into_failover() {
        let (clock, backend, host, manager) = recording();
        manager.start_timer(300_000).unwrap();

        clock.advance(15_000);
        manager.on_alarm(AlarmKind::HealthCheck).unwrap();
        assert_eq!(manager.health_status(), TimerHealthStatus::PrimaryUnresponsive);
        assert!(backend.is_pending(AlarmKind::Failover));

        clock.advance(5_000);
        manager.on_alarm(AlarmKind::Failover).unwrap();
        assert_eq!(manager.timer_state(), TimerRedundancyState::Running);
        assert_eq!(manager.health_status(), TimerHealthStatus::FailoverActivated);
        assert_eq!(*host.restarts.lock().unwrap(), vec![280_000]);
        assert!(backend.is_pending(AlarmKind::Backup));
        assert!(backend.is_pending(AlarmKind::HealthCheck));
    }

    #[tokio::test(start_paused = true)]
    async fn backup_alarm_completes_session_when_primary_never_reports() {
        let clock = ManualClock::new(1_700_000_000_000);
        let dispatcher = Arc::new(AlarmDispatcher::new());
        let backend = Arc::new(TokioAlarmBackend::new(Arc::new(clock.clone()), dispatcher.clone()));
        let (host, manager) = build(&clock, backend.clone());
        let manager = Arc::new(manager);
        manager.register_alarm_handler(&dispatcher);

        manager.start_timer(2_000).unwrap();
        backend.cancel(AlarmKind::HealthCheck);

        // Wall clock and runtime clock move together here
        clock.advance(7_000);
        tokio::time::sleep(Duration::from_millis(7_001)).await;

        assert_eq!(manager.timer_state(), TimerRedundancyState::Stopped);
        assert_eq!(manager.health_status(), TimerHealthStatus::FailoverActivated);
        assert_eq!(*host.completions.lock().unwrap(), vec![CompletionSource::Backup]);
        assert!(backend.pending_kinds().is_empty());
    }
}
