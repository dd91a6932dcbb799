//! Canonical countdown state machine
//!
//! `TimerStateManager` owns the one authoritative record of the active
//! countdown: lifecycle state, timing base, last heartbeat and health. It does
//! no I/O and schedules nothing; every other component reads it and mutates it
//! only through the methods below. Expected remaining time is always derived
//! from the wall clock as `max(0, duration - (now - start))`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{HeartbeatOutcome, TimerHealthStatus, TimerRedundancyState, TimerSnapshot};
use crate::clock::Clock;

#[derive(Debug, Default)]
struct Inner {
    state: TimerRedundancyState,
    health: TimerHealthStatus,
    start_time_epoch_ms: u64,
    duration_ms: u64,
    last_health_check_epoch_ms: u64,
    primary_timer_alive: bool,
    /// Remaining time captured by the last pause, reported while paused
    paused_remaining_ms: u64,
}

impl Inner {
    fn expected_remaining_ms(&self, now: u64) -> u64 {
        match self.state {
            TimerRedundancyState::Running => {
                let elapsed = now.saturating_sub(self.start_time_epoch_ms);
                self.duration_ms.saturating_sub(elapsed)
            }
            TimerRedundancyState::Paused => self.paused_remaining_ms,
            TimerRedundancyState::Stopped => 0,
        }
    }
}

/// Single source of truth for the active countdown
#[derive(Debug)]
pub struct TimerStateManager {
    clock: Arc<dyn Clock>,
    drift_tolerance_ms: u64,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<TimerRedundancyState>,
    health_tx: watch::Sender<TimerHealthStatus>,
}

impl TimerStateManager {
    pub fn new(clock: Arc<dyn Clock>, drift_tolerance_ms: u64) -> Self {
        let (state_tx, _) = watch::channel(TimerRedundancyState::Stopped);
        let (health_tx, _) = watch::channel(TimerHealthStatus::Healthy);

        Self {
            clock,
            drift_tolerance_ms,
            inner: Mutex::new(Inner::default()),
            state_tx,
            health_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish the committed record to observers. Called with the lock held so
    /// observers never see updates out of order.
    fn publish(&self, inner: &Inner) {
        let state = inner.state;
        let health = inner.health;
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        self.health_tx.send_if_modified(|current| {
            let changed = *current != health;
            *current = health;
            changed
        });
    }

    /// Begin a fresh RUNNING period of `duration_ms`.
    ///
    /// There is no guard against calling this while already running: the
    /// timing base is simply overwritten. Use pause/resume to continue a
    /// session.
    pub fn start_timer(&self, duration_ms: u64) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if inner.state.is_running() {
            warn!("start_timer called while running, rebasing timing to {}ms", duration_ms);
        }

        inner.start_time_epoch_ms = now;
        inner.duration_ms = duration_ms;
        inner.last_health_check_epoch_ms = now;
        inner.primary_timer_alive = true;
        inner.paused_remaining_ms = 0;
        inner.state = TimerRedundancyState::Running;
        inner.health = TimerHealthStatus::Healthy;
        self.publish(&inner);

        info!("Timer started for {}ms", duration_ms);
    }

    /// Pause a running timer and return the remaining time.
    ///
    /// Returns 0 without touching anything unless the timer is running. The
    /// caller keeps the returned value to resume later.
    pub fn pause_timer(&self) -> u64 {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if !inner.state.is_running() {
            debug!("pause_timer ignored while {}", inner.state);
            return 0;
        }

        let remaining = inner.expected_remaining_ms(now);
        inner.state = TimerRedundancyState::Paused;
        inner.primary_timer_alive = false;
        inner.paused_remaining_ms = remaining;
        self.publish(&inner);

        info!("Timer paused with {}ms remaining", remaining);
        remaining
    }

    /// Resume a paused timer with `remaining_ms` as the new period length
    pub fn resume_timer(&self, remaining_ms: u64) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if inner.state != TimerRedundancyState::Paused {
            debug!("resume_timer ignored while {}", inner.state);
            return;
        }

        inner.start_time_epoch_ms = now;
        inner.duration_ms = remaining_ms;
        inner.last_health_check_epoch_ms = now;
        inner.primary_timer_alive = true;
        inner.paused_remaining_ms = 0;
        inner.state = TimerRedundancyState::Running;
        inner.health = TimerHealthStatus::Healthy;
        self.publish(&inner);

        info!("Timer resumed with {}ms remaining", remaining_ms);
    }

    /// End the current session unconditionally
    pub fn stop_timer(&self) {
        let mut inner = self.lock();
        let previous = inner.state;

        inner.state = TimerRedundancyState::Stopped;
        inner.health = TimerHealthStatus::Healthy;
        inner.primary_timer_alive = false;
        inner.paused_remaining_ms = 0;
        self.publish(&inner);

        if previous != TimerRedundancyState::Stopped {
            info!("Timer stopped (was {})", previous);
        }
    }

    /// Record a heartbeat from the primary countdown loop.
    ///
    /// Drift beyond tolerance re-anchors the timing base so that the expected
    /// remaining time matches the heartbeat from now on.
    pub fn report_primary_timer_heartbeat(&self, current_remaining_ms: u64) -> HeartbeatOutcome {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if !inner.state.is_running() {
            return HeartbeatOutcome::Ignored;
        }

        inner.primary_timer_alive = true;
        inner.last_health_check_epoch_ms = now;

        let expected = inner.expected_remaining_ms(now);
        let drift_ms = current_remaining_ms.abs_diff(expected);

        let outcome = if drift_ms > self.drift_tolerance_ms {
            warn!(
                "Primary timer drift of {}ms (reported {}ms, expected {}ms), re-anchoring",
                drift_ms, current_remaining_ms, expected
            );
            if current_remaining_ms <= inner.duration_ms {
                inner.start_time_epoch_ms =
                    now.saturating_sub(inner.duration_ms - current_remaining_ms);
            } else {
                // Reported more than the whole period: restart the period from here
                inner.start_time_epoch_ms = now;
                inner.duration_ms = current_remaining_ms;
            }
            inner.health = TimerHealthStatus::DriftDetected;
            HeartbeatOutcome::DriftDetected { drift_ms }
        } else if inner.health == TimerHealthStatus::DriftDetected {
            info!("Primary timer drift cleared ({}ms)", drift_ms);
            inner.health = TimerHealthStatus::Healthy;
            HeartbeatOutcome::DriftCleared { drift_ms }
        } else {
            HeartbeatOutcome::Healthy { drift_ms }
        };

        self.publish(&inner);
        outcome
    }

    /// Re-anchor a running timer on its expected remaining time and set
    /// `health`, as one transition. Returns the remaining time, or `None`
    /// unless running.
    ///
    /// The lifecycle state stays RUNNING throughout; observers see at most a
    /// health change.
    pub fn rebase_running(&self, health: TimerHealthStatus) -> Option<u64> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if !inner.state.is_running() {
            debug!("rebase_running ignored while {}", inner.state);
            return None;
        }

        let remaining = inner.expected_remaining_ms(now);
        inner.start_time_epoch_ms = now;
        inner.duration_ms = remaining;
        inner.last_health_check_epoch_ms = now;
        inner.primary_timer_alive = true;
        inner.health = health;
        self.publish(&inner);

        info!("Timer re-anchored with {}ms remaining ({})", remaining, health);
        Some(remaining)
    }

    /// Direct health override, used by the health monitor for failover states
    pub fn set_health_status(&self, status: TimerHealthStatus) {
        let mut inner = self.lock();
        if inner.health != status {
            debug!("Health status {} -> {}", inner.health, status);
        }
        inner.health = status;
        self.publish(&inner);
    }

    pub fn state(&self) -> TimerRedundancyState {
        self.lock().state
    }

    pub fn health_status(&self) -> TimerHealthStatus {
        self.lock().health
    }

    pub fn timer_start_time(&self) -> u64 {
        self.lock().start_time_epoch_ms
    }

    pub fn timer_duration_ms(&self) -> u64 {
        self.lock().duration_ms
    }

    pub fn last_health_check(&self) -> u64 {
        self.lock().last_health_check_epoch_ms
    }

    pub fn is_primary_timer_alive(&self) -> bool {
        self.lock().primary_timer_alive
    }

    /// Remaining time according to the wall clock: live while running, frozen
    /// while paused, zero when stopped.
    pub fn expected_remaining_ms(&self) -> u64 {
        let now = self.clock.now_ms();
        self.lock().expected_remaining_ms(now)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let now = self.clock.now_ms();
        let inner = self.lock();
        TimerSnapshot {
            state: inner.state,
            health: inner.health,
            start_time_epoch_ms: inner.start_time_epoch_ms,
            duration_ms: inner.duration_ms,
            expected_remaining_ms: inner.expected_remaining_ms(now),
            last_health_check_epoch_ms: inner.last_health_check_epoch_ms,
            primary_timer_alive: inner.primary_timer_alive,
        }
    }

    /// Read-only stream of lifecycle changes
    pub fn subscribe_state(&self) -> watch::Receiver<TimerRedundancyState> {
        self.state_tx.subscribe()
    }

    /// Read-only stream of health changes
    pub fn subscribe_health(&self) -> watch::Receiver<TimerHealthStatus> {
        self.health_tx.subscribe()
    }
}
