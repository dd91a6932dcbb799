//! Main application state management

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{TimerHealthStatus, TimerRedundancyState, TimerStateManager};
use crate::{
    alarms::{AlarmBackend, AlarmDispatcher, AlarmScheduler},
    clock::Clock,
    config::RedundancyConfig,
    error::SessionError,
    health::{HealthMonitor, HealthTelemetry, TelemetryReport},
    host::{CompletionSource, TimerEvent},
    redundancy::TimerRedundancyManager,
    session::{CycleDurations, CycleType, SessionTracker},
    tasks::CountdownHost,
};

/// Timer information reported by the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerStatus {
    pub state: TimerRedundancyState,
    pub health: TimerHealthStatus,
    pub cycle: CycleType,
    pub remaining_ms: u64,
    pub duration_ms: u64,
    pub completed_work_sessions: u32,
    pub primary_timer_alive: bool,
}

#[derive(Debug)]
struct Session {
    tracker: SessionTracker,
    /// Remaining time captured by the last pause
    paused_remaining_ms: Option<u64>,
    last_action: Option<String>,
    last_action_time: Option<DateTime<Utc>>,
}

/// Application state shared by the HTTP handlers and the background tasks
#[derive(Debug)]
pub struct AppState {
    pub manager: Arc<TimerRedundancyManager>,
    pub countdown: Arc<CountdownHost>,
    pub durations: CycleDurations,
    session: Mutex<Session>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
}

impl AppState {
    /// Wire the timer core, the primary countdown loop and the alarm
    /// dispatcher together
    pub fn assemble(
        clock: Arc<dyn Clock>,
        config: RedundancyConfig,
        durations: CycleDurations,
        backend: Arc<dyn AlarmBackend>,
        dispatcher: &AlarmDispatcher,
        port: u16,
        host: String,
    ) -> Self {
        let state = Arc::new(TimerStateManager::new(clock.clone(), config.drift_tolerance_ms));
        let telemetry = Arc::new(HealthTelemetry::default());
        let alarms = Arc::new(AlarmScheduler::new(backend, clock.clone(), config));
        let countdown = Arc::new(CountdownHost::new(state.clone(), telemetry.clone()));

        let monitor = HealthMonitor::new(
            state.clone(),
            alarms.clone(),
            countdown.clone(),
            telemetry.clone(),
            clock,
        );
        let manager = Arc::new(TimerRedundancyManager::new(state, alarms, monitor, telemetry));
        manager.register_alarm_handler(dispatcher);

        Self {
            manager,
            countdown,
            durations,
            session: Mutex::new(Session {
                tracker: SessionTracker::new(durations.long_break_interval),
                paused_remaining_ms: None,
                last_action: None,
                last_action_time: None,
            }),
            start_time: Instant::now(),
            port,
            host,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(session: &mut Session, action: &str) {
        session.last_action = Some(action.to_string());
        session.last_action_time = Some(Utc::now());
    }

    /// Start a session. Defaults to the tracker's current cycle and that
    /// cycle's configured duration.
    pub fn start_session(
        &self,
        cycle: Option<CycleType>,
        duration_ms: Option<u64>,
    ) -> Result<TimerStatus, SessionError> {
        let mut session = self.lock();
        let cycle = cycle.unwrap_or_else(|| session.tracker.current());
        let duration_ms = duration_ms.unwrap_or_else(|| self.durations.duration_ms(cycle));
        if duration_ms == 0 {
            return Err(SessionError::ZeroDuration);
        }

        session.tracker.select(cycle);
        session.paused_remaining_ms = None;
        Self::touch(&mut session, "start");

        if let Err(e) = self.manager.start_timer(duration_ms) {
            self.countdown.halt();
            return Err(e.into());
        }
        self.countdown.launch(cycle, duration_ms);
        drop(session);

        info!("Started {} session for {}ms", cycle, duration_ms);
        Ok(self.status())
    }

    /// Pause the running session. Pausing anything else is a no-op.
    pub fn pause_session(&self) -> TimerStatus {
        let mut session = self.lock();
        if self.manager.timer_state().is_running() {
            let remaining = self.manager.pause_timer();
            self.countdown.halt();
            session.paused_remaining_ms = Some(remaining);
            Self::touch(&mut session, "pause");
        }
        drop(session);
        self.status()
    }

    pub fn resume_session(&self) -> Result<TimerStatus, SessionError> {
        let mut session = self.lock();
        let remaining = match session.paused_remaining_ms {
            Some(remaining) if self.manager.timer_state() == TimerRedundancyState::Paused => {
                remaining
            }
            _ => return Err(SessionError::NothingToResume),
        };

        self.manager.resume_timer(remaining)?;
        session.paused_remaining_ms = None;
        Self::touch(&mut session, "resume");
        self.countdown.resume(remaining);
        drop(session);

        Ok(self.status())
    }

    pub fn stop_session(&self) -> TimerStatus {
        let mut session = self.lock();
        self.manager.stop_timer();
        self.countdown.halt();
        session.paused_remaining_ms = None;
        Self::touch(&mut session, "stop");
        drop(session);
        self.status()
    }

    /// Record that `cycle` finished and advance to the next cycle.
    ///
    /// Returns `None` for a completion whose countdown has since been
    /// replaced, paused or stopped. A backup completion has already stopped
    /// the timer and left the failover health status in place; only a
    /// primary completion still has alarms to tear down.
    pub fn finish_cycle(
        &self,
        cycle: CycleType,
        source: CompletionSource,
        generation: u64,
    ) -> Option<CycleType> {
        let mut session = self.lock();
        if !self.countdown.is_current(generation) {
            debug!("Stale {} completion ({:?}) ignored", cycle, source);
            return None;
        }
        if source == CompletionSource::Primary {
            self.manager.stop_timer();
        }

        session.paused_remaining_ms = None;
        let next = session.tracker.complete(cycle);
        Self::touch(&mut session, "complete");

        info!("{} finished ({:?}), next up: {}", cycle, source, next);
        Some(next)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.countdown.subscribe_events()
    }

    pub fn status(&self) -> TimerStatus {
        let snapshot = self.manager.snapshot();
        let session = self.lock();

        let cycle = if snapshot.state == TimerRedundancyState::Stopped {
            session.tracker.current()
        } else {
            self.countdown.current_cycle()
        };

        TimerStatus {
            state: snapshot.state,
            health: snapshot.health,
            cycle,
            remaining_ms: snapshot.expected_remaining_ms,
            duration_ms: snapshot.duration_ms,
            completed_work_sessions: session.tracker.completed_work_sessions(),
            primary_timer_alive: snapshot.primary_timer_alive,
        }
    }

    pub fn diagnostics(&self) -> TelemetryReport {
        self.manager.telemetry().report()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let session = self.lock();
        (session.last_action.clone(), session.last_action_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alarms::{AlarmKind, RecordingAlarmBackend},
        clock::ManualClock,
        host::TimerHost,
        state::TimerHealthStatus,
    };

    /// Generation of the completion the countdown host would emit now
    fn current_generation(app: &AppState) -> u64 {
        let mut events = app.subscribe_events();
        app.countdown.complete_timer(CompletionSource::Primary);
        match events.try_recv() {
            Ok(TimerEvent::Completed { generation, .. }) => generation,
            Err(e) => panic!("no completion event: {e}"),
        }
    }

    fn app() -> (ManualClock, Arc<RecordingAlarmBackend>, AppState) {
        let clock = ManualClock::new(1_700_000_000_000);
        let backend = Arc::new(RecordingAlarmBackend::new());
        let dispatcher = AlarmDispatcher::new();
        let app = AppState::assemble(
            Arc::new(clock.clone()),
            RedundancyConfig::default(),
            CycleDurations::default(),
            backend.clone(),
            &dispatcher,
            20554,
            "127.0.0.1".to_string(),
        );
        (clock, backend, app)
    }

    #[tokio::test]
    async fn start_uses_the_current_cycle_duration() {
        let (_clock, backend, app) = app();
        let status = app.start_session(None, None).unwrap();

        assert_eq!(status.state, TimerRedundancyState::Running);
        assert_eq!(status.cycle, CycleType::Work);
        assert_eq!(status.duration_ms, 25 * 60 * 1000);
        assert!(backend.is_pending(AlarmKind::Backup));
        assert!(app.countdown.is_running());
        assert_eq!(app.get_last_action().0.as_deref(), Some("start"));
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let (_clock, backend, app) = app();
        let err = app.start_session(Some(CycleType::Break), Some(0)).unwrap_err();
        assert_eq!(err, SessionError::ZeroDuration);
        assert!(backend.pending_kinds().is_empty());
        assert_eq!(app.status().state, TimerRedundancyState::Stopped);
    }

    #[tokio::test]
    async fn pause_then_resume_continues_with_remaining_time() {
        let (clock, backend, app) = app();
        app.start_session(Some(CycleType::Work), Some(60_000)).unwrap();
        clock.advance(20_000);

        let paused = app.pause_session();
        assert_eq!(paused.state, TimerRedundancyState::Paused);
        assert_eq!(paused.remaining_ms, 40_000);
        assert!(!app.countdown.is_running());

        clock.advance(600_000);
        let resumed = app.resume_session().unwrap();
        assert_eq!(resumed.state, TimerRedundancyState::Running);
        assert_eq!(resumed.duration_ms, 40_000);
        assert_eq!(
            backend.trigger_time(AlarmKind::Backup),
            Some(clock.now_ms() + 40_000 + 5_000)
        );
    }

    #[tokio::test]
    async fn resume_without_pause_is_an_error() {
        let (_clock, _backend, app) = app();
        assert_eq!(app.resume_session().unwrap_err(), SessionError::NothingToResume);

        app.start_session(None, Some(60_000)).unwrap();
        assert_eq!(app.resume_session().unwrap_err(), SessionError::NothingToResume);
    }

    #[tokio::test]
    async fn denied_alarms_fail_the_start() {
        let (_clock, backend, app) = app();
        backend.deny_exact_alarms(true);

        let err = app.start_session(None, None).unwrap_err();
        assert!(matches!(err, SessionError::Alarm(_)));
        assert!(!app.countdown.is_running());

        let status = app.status();
        assert_eq!(status.state, TimerRedundancyState::Stopped);
        assert_eq!(status.health, TimerHealthStatus::BackupUnavailable);
    }

    #[tokio::test]
    async fn finishing_cycles_advances_the_sequence() {
        let (_clock, backend, app) = app();
        app.start_session(None, Some(60_000)).unwrap();

        let generation = current_generation(&app);
        let next = app.finish_cycle(CycleType::Work, CompletionSource::Primary, generation);
        assert_eq!(next, Some(CycleType::Break));
        assert!(backend.pending_kinds().is_empty());

        let status = app.status();
        assert_eq!(status.state, TimerRedundancyState::Stopped);
        assert_eq!(status.cycle, CycleType::Break);
        assert_eq!(status.completed_work_sessions, 1);
    }

    #[tokio::test]
    async fn backup_completion_keeps_failover_health() {
        let (_clock, _backend, app) = app();
        app.start_session(None, Some(60_000)).unwrap();
        app.manager.stop_timer();
        app.manager.state_manager().set_health_status(TimerHealthStatus::FailoverActivated);

        let generation = current_generation(&app);
        app.finish_cycle(CycleType::Work, CompletionSource::Backup, generation);
        assert_eq!(app.status().health, TimerHealthStatus::FailoverActivated);
    }

    #[tokio::test]
    async fn completion_from_before_a_pause_is_ignored() {
        let (clock, backend, app) = app();
        app.start_session(None, Some(60_000)).unwrap();
        let generation = current_generation(&app);
        app.countdown.resume(60_000);
        clock.advance(1_000);
        app.pause_session();

        assert_eq!(app.finish_cycle(CycleType::Work, CompletionSource::Primary, generation), None);

        let status = app.status();
        assert_eq!(status.state, TimerRedundancyState::Paused);
        assert_eq!(status.completed_work_sessions, 0);
        assert!(app.resume_session().is_ok());
        assert!(backend.is_pending(AlarmKind::Backup));
    }

    #[tokio::test]
    async fn stop_clears_everything() {
        let (_clock, backend, app) = app();
        app.start_session(None, Some(60_000)).unwrap();
        app.pause_session();

        let status = app.stop_session();
        assert_eq!(status.state, TimerRedundancyState::Stopped);
        assert_eq!(status.remaining_ms, 0);
        assert!(backend.pending_kinds().is_empty());
        assert_eq!(app.resume_session().unwrap_err(), SessionError::NothingToResume);
    }
}
