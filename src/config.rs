//! Configuration and CLI argument handling

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::session::CycleDurations;

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "pomodoro-keeper")]
#[command(about = "A Pomodoro countdown host with redundant backup alarms and failover")]
#[command(version = "1.0.0")]
pub struct Config {
    /// Port to bind the control API to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Work session length in minutes
    #[arg(long, default_value = "25")]
    pub work_minutes: u64,

    /// Short break length in minutes
    #[arg(long, default_value = "5")]
    pub break_minutes: u64,

    /// Long break length in minutes
    #[arg(long, default_value = "15")]
    pub long_break_minutes: u64,

    /// Number of work sessions before a long break
    #[arg(long, default_value = "4")]
    pub long_break_interval: u32,

    /// Extra delay added to the backup completion alarm, in milliseconds
    #[arg(long, default_value = "5000")]
    pub safety_margin_ms: u64,

    /// Interval between health-check alarms, in milliseconds
    #[arg(long, default_value = "15000")]
    pub health_check_interval_ms: u64,

    /// Silence after which the primary countdown is presumed dead, in milliseconds
    #[arg(long, default_value = "5000")]
    pub failover_timeout_ms: u64,

    /// Heartbeat deviation tolerated before drift is flagged, in milliseconds
    #[arg(long, default_value = "2000")]
    pub drift_tolerance_ms: u64,

    /// Remaining time under which a backup alarm counts as completion, in milliseconds
    #[arg(long, default_value = "2000")]
    pub completion_tolerance_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Timing parameters for the redundancy subsystem
    pub fn redundancy(&self) -> RedundancyConfig {
        RedundancyConfig {
            safety_margin_ms: self.safety_margin_ms,
            health_check_interval_ms: self.health_check_interval_ms,
            failover_timeout_ms: self.failover_timeout_ms,
            drift_tolerance_ms: self.drift_tolerance_ms,
            completion_tolerance_ms: self.completion_tolerance_ms,
        }
    }

    /// Cycle lengths as supplied by the settings layer
    pub fn cycle_durations(&self) -> CycleDurations {
        CycleDurations::from_minutes(
            self.work_minutes,
            self.break_minutes,
            self.long_break_minutes,
            self.long_break_interval,
        )
    }
}

/// Timing parameters shared by the alarm scheduler, state manager and health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedundancyConfig {
    /// Added to the backup alarm so it fires after the primary would have finished
    pub safety_margin_ms: u64,
    pub health_check_interval_ms: u64,
    /// Heartbeat silence tolerated before failover; also the failover alarm delay
    pub failover_timeout_ms: u64,
    /// Largest disagreement between heartbeat and wall clock treated as healthy
    pub drift_tolerance_ms: u64,
    /// Expected remaining time at or below which the backup alarm counts as completion
    pub completion_tolerance_ms: u64,
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: 5_000,
            health_check_interval_ms: 15_000,
            failover_timeout_ms: 5_000,
            drift_tolerance_ms: 2_000,
            completion_tolerance_ms: 2_000,
        }
    }
}
