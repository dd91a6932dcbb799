//! Pomodoro Keeper - a countdown host that keeps a Pomodoro timer honest
//!
//! The library keeps one active countdown alive with two independent timing
//! sources: the primary one-second countdown loop and a set of exact alarms
//! (backup completion, periodic health check, failover). A health monitor
//! reconciles the two against wall-clock time and fails over when the primary
//! loop stalls.

pub mod alarms;
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod host;
pub mod redundancy;
pub mod session;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use alarms::{AlarmDispatcher, AlarmKind, AlarmScheduler};
pub use api::create_router;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, RedundancyConfig};
pub use error::{AlarmError, SessionError};
pub use health::{HealthMonitor, HealthTelemetry};
pub use redundancy::TimerRedundancyManager;
pub use session::CycleType;
pub use state::{AppState, TimerHealthStatus, TimerRedundancyState, TimerStateManager};
pub use utils::signals::shutdown_signal;
