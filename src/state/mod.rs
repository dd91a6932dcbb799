//! State management module
//!
//! The canonical countdown state machine and the host-level application state
//! wrapped around it.

pub mod app_state;
pub mod state_manager;
pub mod timer_state;

// Re-export main types
pub use app_state::{AppState, TimerStatus};
pub use state_manager::TimerStateManager;
pub use timer_state::{HeartbeatOutcome, TimerHealthStatus, TimerRedundancyState, TimerSnapshot};
