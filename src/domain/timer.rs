//! Single-phase countdown state machine.
//!
//! The engine is plain arithmetic: callers feed it one `tick()` per elapsed
//! second and react to the [`TimerEvent`] it returns. Scheduling lives in
//! `application::timer_driver`.

use crate::domain::models::TimerMode;
use serde::{Deserialize, Serialize};

pub const WORK_SECONDS: u32 = 25 * 60;
pub const SHORT_BREAK_SECONDS: u32 = 5 * 60;
pub const LONG_BREAK_SECONDS: u32 = 15 * 60;
pub const SESSIONS_UNTIL_LONG_BREAK: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDurations {
    pub work_seconds: u32,
    pub short_break_seconds: u32,
    pub long_break_seconds: u32,
    pub sessions_until_long_break: u32,
}

impl Default for TimerDurations {
    fn default() -> Self {
        Self {
            work_seconds: WORK_SECONDS,
            short_break_seconds: SHORT_BREAK_SECONDS,
            long_break_seconds: LONG_BREAK_SECONDS,
            sessions_until_long_break: SESSIONS_UNTIL_LONG_BREAK,
        }
    }
}

impl TimerDurations {
    pub fn validate(&self) -> Result<(), String> {
        if self.work_seconds == 0 {
            return Err("timer.work_seconds must be > 0".to_string());
        }
        if self.short_break_seconds == 0 {
            return Err("timer.short_break_seconds must be > 0".to_string());
        }
        if self.long_break_seconds == 0 {
            return Err("timer.long_break_seconds must be > 0".to_string());
        }
        if self.sessions_until_long_break == 0 {
            return Err("timer.sessions_until_long_break must be > 0".to_string());
        }
        Ok(())
    }

    pub fn duration(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Work => self.work_seconds,
            TimerMode::ShortBreak => self.short_break_seconds,
            TimerMode::LongBreak => self.long_break_seconds,
        }
    }
}

/// Raised when a countdown reaches zero (or is skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The completion event: a work phase ran out.
    WorkCompleted { session_count: u32 },
    BreakElapsed { mode: TimerMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub mode: TimerMode,
    pub time_remaining: u32,
    pub is_running: bool,
    pub session_count: u32,
}

#[derive(Debug, Clone)]
pub struct TimerEngine {
    durations: TimerDurations,
    mode: TimerMode,
    time_remaining: u32,
    is_running: bool,
    session_count: u32,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(TimerDurations::default())
    }
}

impl TimerEngine {
    pub fn new(durations: TimerDurations) -> Self {
        Self {
            durations,
            mode: TimerMode::Work,
            time_remaining: durations.work_seconds,
            is_running: false,
            session_count: 0,
        }
    }

    pub fn durations(&self) -> TimerDurations {
        self.durations
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            mode: self.mode,
            time_remaining: self.time_remaining,
            is_running: self.is_running,
            session_count: self.session_count,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn session_count(&self) -> u32 {
        self.session_count
    }

    /// Returns `true` if the engine transitioned to running.
    pub fn start(&mut self) -> bool {
        if self.is_running || self.time_remaining == 0 {
            return false;
        }
        self.is_running = true;
        true
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    pub fn reset(&mut self) {
        self.is_running = false;
        self.time_remaining = self.durations.duration(self.mode);
    }

    pub fn switch_mode(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.time_remaining = self.durations.duration(mode);
        self.is_running = false;
    }

    /// Forces the current phase to end now and always yields its event.
    pub fn skip(&mut self) -> TimerEvent {
        self.time_remaining = 0;
        self.finish()
    }

    /// Advances the countdown by one second.
    pub fn tick(&mut self) -> Option<TimerEvent> {
        if !self.is_running || self.time_remaining == 0 {
            return None;
        }
        self.time_remaining -= 1;
        if self.time_remaining == 0 {
            return Some(self.finish());
        }
        None
    }

    /// Break that should follow the work sessions completed so far.
    pub fn next_break_mode(&self) -> TimerMode {
        let cadence = self.durations.sessions_until_long_break.max(1);
        if self.session_count > 0 && self.session_count % cadence == 0 {
            TimerMode::LongBreak
        } else {
            TimerMode::ShortBreak
        }
    }

    fn finish(&mut self) -> TimerEvent {
        self.is_running = false;
        match self.mode {
            TimerMode::Work => {
                self.session_count += 1;
                TimerEvent::WorkCompleted {
                    session_count: self.session_count,
                }
            }
            mode => TimerEvent::BreakElapsed { mode },
        }
    }
}

/// Renders seconds as `MM:SS`.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
