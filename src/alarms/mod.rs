//! Exact-alarm scheduling module
//!
//! Alarms are the second, independent timing source behind the primary
//! countdown loop. The scheduler computes trigger times, a backend talks to the
//! platform alarm facility, and fired alarms reach their handlers through the
//! dispatcher table.

pub mod backend;
pub mod dispatch;
pub mod kind;
pub mod scheduler;

// Re-export main types
pub use backend::{AlarmBackend, RecordingAlarmBackend, TokioAlarmBackend};
pub use dispatch::{AlarmDispatcher, AlarmHandler};
pub use kind::AlarmKind;
pub use scheduler::AlarmScheduler;
