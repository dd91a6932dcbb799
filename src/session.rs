//! Pomodoro cycle kinds and their sequencing

use serde::{Deserialize, Serialize};

/// Kind of countdown being run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleType {
    Work,
    Break,
    LongBreak,
}

impl CycleType {
    pub fn label(&self) -> &'static str {
        match self {
            CycleType::Work => "Work",
            CycleType::Break => "Short Break",
            CycleType::LongBreak => "Long Break",
        }
    }

    /// The cycle that follows this one.
    ///
    /// `completed_work_sessions` counts work sessions finished so far,
    /// including this one when `self` is `Work`.
    pub fn next(&self, completed_work_sessions: u32, long_break_interval: u32) -> CycleType {
        match self {
            CycleType::Work => {
                if long_break_interval > 0
                    && completed_work_sessions > 0
                    && completed_work_sessions % long_break_interval == 0
                {
                    CycleType::LongBreak
                } else {
                    CycleType::Break
                }
            }
            CycleType::Break | CycleType::LongBreak => CycleType::Work,
        }
    }
}

impl std::fmt::Display for CycleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Cycle lengths supplied by the settings layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleDurations {
    pub work_ms: u64,
    pub break_ms: u64,
    pub long_break_ms: u64,
    pub long_break_interval: u32,
}

impl CycleDurations {
    pub fn from_minutes(
        work: u64,
        short_break: u64,
        long_break: u64,
        long_break_interval: u32,
    ) -> Self {
        Self {
            work_ms: minutes_to_ms(work),
            break_ms: minutes_to_ms(short_break),
            long_break_ms: minutes_to_ms(long_break),
            long_break_interval,
        }
    }

    pub fn duration_ms(&self, cycle: CycleType) -> u64 {
        match cycle {
            CycleType::Work => self.work_ms,
            CycleType::Break => self.break_ms,
            CycleType::LongBreak => self.long_break_ms,
        }
    }
}

impl Default for CycleDurations {
    fn default() -> Self {
        Self::from_minutes(25, 5, 15, 4)
    }
}

fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60).saturating_mul(1000)
}

/// Tracks where the user is in the work/break sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTracker {
    current: CycleType,
    completed_work_sessions: u32,
    long_break_interval: u32,
}

impl SessionTracker {
    pub fn new(long_break_interval: u32) -> Self {
        Self {
            current: CycleType::Work,
            completed_work_sessions: 0,
            long_break_interval,
        }
    }

    pub fn current(&self) -> CycleType {
        self.current
    }

    pub fn completed_work_sessions(&self) -> u32 {
        self.completed_work_sessions
    }

    /// Select the cycle the next session will run
    pub fn select(&mut self, cycle: CycleType) {
        self.current = cycle;
    }

    /// Record that `cycle` ran to completion and advance. Returns the next cycle.
    pub fn complete(&mut self, cycle: CycleType) -> CycleType {
        if cycle == CycleType::Work {
            self.completed_work_sessions += 1;
        }
        self.current = cycle.next(self.completed_work_sessions, self.long_break_interval);
        self.current
    }
}
