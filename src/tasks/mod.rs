//! Background tasks module
//!
//! This module contains the primary countdown loop and the tasks that run
//! alongside the HTTP server.

pub mod completion;
pub mod countdown;

// Re-export main types and functions
pub use completion::completion_listener_task;
pub use countdown::{CountdownHost, CountdownProgress};
