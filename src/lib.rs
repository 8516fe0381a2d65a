//! Pomodoro study timer with per-problem notes.
//!
//! Solved sessions are written to a local SQLite-backed store and mirrored on a
//! best-effort basis to a remote document store. [`AppState`] and the `*_impl`
//! functions in [`application::commands`] are the surface a UI shell calls.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    AppServices, AppState, TimerEventResponse, attach_video_impl, delete_record_impl,
    end_session_impl, get_session_state_impl, get_stats_impl, list_records_impl,
    pause_timer_impl, reset_timer_impl, resolve_keep_working_impl, resolve_solved_impl,
    skip_timer_impl, start_session_impl, start_timer_impl, switch_mode_impl, update_notes_impl,
};
pub use domain::models::{Difficulty, Record, TimerMode};
pub use infrastructure::error::InfraError;
