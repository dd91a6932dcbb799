//! Error types for the timer core and the session layer

use thiserror::Error;

use crate::alarms::AlarmKind;

/// Failures of the exact-alarm facility.
///
/// These are configuration failures: without exact alarms the backup and
/// failover paths cannot keep their timing guarantees, so they are surfaced
/// to the caller instead of degrading to inexact delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// The platform refused or cannot provide exact alarm scheduling
    #[error("Exact alarm scheduling unavailable for {kind} alarm: {reason}")]
    ExactAlarmUnavailable { kind: AlarmKind, reason: String },

    /// The requested trigger time does not fit in the clock range
    #[error("Trigger time for {kind} alarm overflows the clock range")]
    TriggerOverflow { kind: AlarmKind },
}

/// Errors raised when the host drives a Pomodoro session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session duration must be greater than zero")]
    ZeroDuration,

    #[error("No paused session to resume")]
    NothingToResume,

    #[error(transparent)]
    Alarm(#[from] AlarmError),
}
