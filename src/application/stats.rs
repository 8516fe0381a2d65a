use crate::domain::models::{Difficulty, Record};
use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyCounts {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_problems: u32,
    pub total_time_seconds: u64,
    pub total_time_label: String,
    pub by_difficulty: DifficultyCounts,
    pub total_sessions: u32,
    pub average_sessions_per_problem: f64,
    pub current_streak: u32,
}

/// Aggregates solved records. `today` is the current calendar day in `timezone`.
pub fn summarize(records: &[Record], today: NaiveDate, timezone: Tz) -> StatsSummary {
    let solved = records.iter().filter(|record| record.is_solved());

    let mut by_difficulty = DifficultyCounts::default();
    let mut total_problems = 0u32;
    let mut total_time_seconds = 0u64;
    let mut total_sessions = 0u32;
    for record in solved {
        total_problems += 1;
        total_time_seconds += record.total_time_spent;
        total_sessions += record.sessions_count;
        match record.difficulty {
            Difficulty::Easy => by_difficulty.easy += 1,
            Difficulty::Medium => by_difficulty.medium += 1,
            Difficulty::Hard => by_difficulty.hard += 1,
        }
    }

    let average_sessions_per_problem = if total_problems == 0 {
        0.0
    } else {
        (f64::from(total_sessions) / f64::from(total_problems) * 10.0).round() / 10.0
    };

    StatsSummary {
        total_problems,
        total_time_seconds,
        total_time_label: format_total_time(total_time_seconds),
        by_difficulty,
        total_sessions,
        average_sessions_per_problem,
        current_streak: current_streak(records, today, timezone),
    }
}

/// Consecutive days with at least one solve, ending today or yesterday.
pub fn current_streak(records: &[Record], today: NaiveDate, timezone: Tz) -> u32 {
    let solved_days = records
        .iter()
        .filter_map(|record| record.date_solved)
        .map(|solved| solved.with_timezone(&timezone).date_naive())
        .collect::<BTreeSet<_>>();

    let mut cursor = if solved_days.contains(&today) {
        today
    } else {
        match today.checked_sub_days(Days::new(1)) {
            Some(yesterday) if solved_days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut streak = 0;
    while solved_days.contains(&cursor) {
        streak += 1;
        match cursor.checked_sub_days(Days::new(1)) {
            Some(previous) => cursor = previous,
            None => break,
        }
    }
    streak
}

/// `"2h 15m"` once an hour has accrued, otherwise `"45m"`.
pub fn format_total_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
