//! Outbound signals from the timer core to the execution host

use serde::{Deserialize, Serialize};

use crate::session::CycleType;

/// Which timing source concluded a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// The primary countdown loop reached zero
    Primary,
    /// The backup alarm proved the session was over
    Backup,
}

/// Events the host emits to the notification and session layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimerEvent {
    /// `generation` identifies the countdown the event belongs to; anything
    /// started, paused or stopped since then makes it stale.
    Completed {
        cycle: CycleType,
        source: CompletionSource,
        generation: u64,
    },
}

/// The long-running execution context hosting the primary countdown loop.
///
/// The health monitor drives these when the redundant path has to act on the
/// primary's behalf.
pub trait TimerHost: Send + Sync + std::fmt::Debug {
    /// Signal completion of the active session
    fn complete_timer(&self, source: CompletionSource);

    /// Replace the primary countdown loop with a fresh one for `remaining_ms`
    fn restart_primary(&self, remaining_ms: u64);
}
