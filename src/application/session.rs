use crate::application::notes_buffer::NotesBuffer;
use crate::application::timer_driver::{ScheduledEvent, TICK_PERIOD, TimerDriver};
use crate::domain::models::{
    Difficulty, Record, SolvedUpdate, TimerMode, generate_record_id, normalize_problem_name,
};
use crate::domain::timer::{TimerDurations, TimerEngine, TimerEvent, TimerState, format_clock};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_record_store::LocalRecordStore;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::remote_record_store::RemoteRecordStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub durations: TimerDurations,
    pub auto_cadence: bool,
    pub autosave_interval: Duration,
    pub tick_period: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            durations: TimerDurations::default(),
            auto_cadence: false,
            autosave_interval: Duration::from_secs(30),
            tick_period: TICK_PERIOD,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            durations: config.timer.durations,
            auto_cadence: config.timer.auto_cadence,
            autosave_interval: config.notes.auto_save_interval(),
            tick_period: TICK_PERIOD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Active,
    AwaitingDecision,
}

/// The in-progress record. It gets an id only when it is finalized.
#[derive(Debug, Clone)]
struct DraftRecord {
    problem_name: String,
    difficulty: Difficulty,
    date_started: DateTime<Utc>,
    sessions_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub problem_name: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub date_started: Option<DateTime<Utc>>,
    pub sessions_count: u32,
    pub notes: String,
    pub timer: TimerState,
    pub clock: String,
    pub next_break_mode: TimerMode,
}

/// Owns the timer and the notes buffer for one study session at a time.
///
/// Lifecycle: `Idle -> Active -> AwaitingDecision -> (Active | Idle)`. A solved
/// decision writes the record locally, then mirrors it remotely in the
/// background. Remote failures are logged only.
pub struct SessionOrchestrator {
    settings: SessionSettings,
    owner_id: String,
    local: Arc<LocalRecordStore>,
    remote: Arc<dyn RemoteRecordStore>,
    notifier: Arc<dyn Notifier>,
    timer: TimerDriver,
    notes: NotesBuffer,
    phase: SessionPhase,
    draft: Option<DraftRecord>,
    mirrors: JoinSet<()>,
    now_provider: NowProvider,
}

impl SessionOrchestrator {
    pub fn new(
        settings: SessionSettings,
        owner_id: impl Into<String>,
        local: Arc<LocalRecordStore>,
        remote: Arc<dyn RemoteRecordStore>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, UnboundedReceiver<ScheduledEvent>) {
        let (timer, events) =
            TimerDriver::new(TimerEngine::new(settings.durations), settings.tick_period);
        let notes = NotesBuffer::new(Arc::clone(&local), settings.autosave_interval);
        let orchestrator = Self {
            settings,
            owner_id: owner_id.into(),
            local,
            remote,
            notifier,
            timer,
            notes,
            phase: SessionPhase::Idle,
            draft: None,
            mirrors: JoinSet::new(),
            now_provider: Arc::new(Utc::now),
        };
        (orchestrator, events)
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Begins a session and returns the restored note draft for `problem_name`.
    pub fn start_session(
        &mut self,
        problem_name: &str,
        difficulty: Difficulty,
    ) -> Result<String, InfraError> {
        let problem_name = normalize_problem_name(problem_name).map_err(InfraError::Validation)?;
        if self.phase != SessionPhase::Idle {
            return Err(InfraError::InvalidState(
                "a session is already in progress".to_string(),
            ));
        }

        self.timer.switch_mode(TimerMode::Work)?;
        let restored = self.notes.bind(&problem_name);
        self.draft = Some(DraftRecord {
            problem_name: problem_name.clone(),
            difficulty,
            date_started: (self.now_provider)(),
            sessions_count: 1,
        });
        self.phase = SessionPhase::Active;
        info!(
            problem_name = %problem_name,
            difficulty = difficulty.as_str(),
            restored_notes = !restored.is_empty(),
            "session started"
        );
        Ok(restored)
    }

    /// Starts the countdown. Ignored while a decision is pending.
    pub fn start_timer(&mut self) -> Result<bool, InfraError> {
        match self.phase {
            SessionPhase::Idle => Err(InfraError::InvalidState(
                "start a session before starting the timer".to_string(),
            )),
            SessionPhase::AwaitingDecision => {
                debug!("timer start ignored while awaiting decision");
                Ok(false)
            }
            SessionPhase::Active => self.timer.start(),
        }
    }

    pub fn pause_timer(&mut self) -> Result<(), InfraError> {
        self.timer.pause()
    }

    pub fn reset_timer(&mut self) -> Result<(), InfraError> {
        self.timer.reset()
    }

    pub fn switch_mode(&mut self, mode: TimerMode) -> Result<(), InfraError> {
        self.timer.switch_mode(mode)?;
        debug!(mode = mode.as_str(), "timer mode switched");
        Ok(())
    }

    /// Ends the current phase now and handles its event in place.
    pub fn skip_timer(&mut self) -> Result<TimerEvent, InfraError> {
        if self.phase != SessionPhase::Active {
            return Err(InfraError::InvalidState(
                "no active session to skip".to_string(),
            ));
        }
        let event = self.timer.skip()?;
        self.apply_event(event)?;
        Ok(event)
    }

    /// Handles a completion from the tick channel. Completions from a schedule
    /// that was since stopped or replaced are dropped.
    pub fn handle_timer_event(&mut self, scheduled: ScheduledEvent) -> Result<(), InfraError> {
        if !self.timer.is_current(scheduled.generation) {
            debug!(
                generation = scheduled.generation,
                event = ?scheduled.event,
                "stale timer event dropped"
            );
            return Ok(());
        }
        self.apply_event(scheduled.event)
    }

    fn apply_event(&mut self, event: TimerEvent) -> Result<(), InfraError> {
        match event {
            TimerEvent::WorkCompleted { session_count } => {
                if self.phase != SessionPhase::Active {
                    debug!(session_count, "work completion ignored outside an active session");
                    return Ok(());
                }
                self.on_timer_complete();
                Ok(())
            }
            TimerEvent::BreakElapsed { mode } => {
                info!(mode = mode.as_str(), "break elapsed");
                self.notifier.notify("Break over", "Time to get back to work.");
                if self.settings.auto_cadence && self.phase == SessionPhase::Active {
                    self.timer.switch_mode(TimerMode::Work)?;
                    self.timer.start()?;
                }
                Ok(())
            }
        }
    }

    /// Raises the "did you solve it" decision for the finished work phase.
    pub fn on_timer_complete(&mut self) {
        let Some(draft) = &self.draft else {
            return;
        };
        let body = format!("Did you solve {}?", draft.problem_name);
        info!(
            problem_name = %draft.problem_name,
            sessions_count = draft.sessions_count,
            "work phase complete; awaiting decision"
        );
        self.notifier.notify("Pomodoro complete", &body);
        self.phase = SessionPhase::AwaitingDecision;
    }

    /// Finalizes the session as solved.
    ///
    /// The local write completes before the remote mirror is spawned; neither
    /// failure is returned to the caller.
    pub fn resolve_solved(&mut self) -> Result<Record, InfraError> {
        if self.phase != SessionPhase::AwaitingDecision {
            return Err(InfraError::InvalidState(
                "no completed work phase to resolve".to_string(),
            ));
        }
        let draft = self
            .draft
            .take()
            .ok_or_else(|| InfraError::InvalidState("session has no draft record".to_string()))?;

        let now = (self.now_provider)();
        let record = Record {
            id: generate_record_id(),
            problem_name: draft.problem_name,
            difficulty: draft.difficulty,
            notes: self.notes.get(),
            video_url: None,
            date_started: draft.date_started,
            date_solved: Some(now.max(draft.date_started)),
            sessions_count: draft.sessions_count,
            total_time_spent: total_time_spent(
                draft.sessions_count,
                self.settings.durations.work_seconds,
            ),
            created_at: now,
        };

        let saved_locally = match self.local.save(&record) {
            Ok(()) => true,
            Err(error) => {
                error!(%error, record_id = %record.id, "failed to save solved record locally");
                false
            }
        };
        self.spawn_mirror(record.clone());

        // The draft is the only local copy of the notes until the record is stored.
        if saved_locally {
            if let Err(error) = self.notes.discard_saved() {
                warn!(%error, problem_name = %record.problem_name, "failed to clear saved notes");
            }
        }
        self.finish();
        info!(
            record_id = %record.id,
            sessions_count = record.sessions_count,
            total_time_spent = record.total_time_spent,
            "session solved"
        );
        Ok(record)
    }

    /// Charges another work cycle to the problem and returns the new count.
    pub fn resolve_keep_working(&mut self) -> Result<u32, InfraError> {
        if self.phase != SessionPhase::AwaitingDecision {
            return Err(InfraError::InvalidState(
                "no completed work phase to resolve".to_string(),
            ));
        }
        let draft = self
            .draft
            .as_mut()
            .ok_or_else(|| InfraError::InvalidState("session has no draft record".to_string()))?;
        draft.sessions_count += 1;
        let sessions_count = draft.sessions_count;
        self.phase = SessionPhase::Active;

        if self.settings.auto_cadence {
            let next = self.timer.next_break_mode()?;
            self.timer.switch_mode(next)?;
            self.timer.start()?;
            info!(sessions_count, mode = next.as_str(), "keep working; break started");
        } else {
            self.timer.switch_mode(TimerMode::Work)?;
            info!(sessions_count, "keep working");
        }
        Ok(sessions_count)
    }

    pub fn update_notes(&mut self, text: impl Into<String>) -> Result<(), InfraError> {
        if self.phase == SessionPhase::Idle {
            return Err(InfraError::InvalidState(
                "notes can only be edited during a session".to_string(),
            ));
        }
        self.notes.set(text);
        Ok(())
    }

    /// Abandons the session. Saved notes stay as last auto-saved.
    pub fn end_session(&mut self) -> Result<(), InfraError> {
        if self.phase == SessionPhase::Idle {
            return Ok(());
        }
        if let Some(draft) = &self.draft {
            info!(problem_name = %draft.problem_name, "session ended without solving");
        }
        self.draft = None;
        self.finish();
        Ok(())
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, InfraError> {
        let timer = self.timer.state()?;
        Ok(SessionSnapshot {
            phase: self.phase,
            problem_name: self.draft.as_ref().map(|draft| draft.problem_name.clone()),
            difficulty: self.draft.as_ref().map(|draft| draft.difficulty),
            date_started: self.draft.as_ref().map(|draft| draft.date_started),
            sessions_count: self.draft.as_ref().map_or(0, |draft| draft.sessions_count),
            notes: self.notes.get(),
            clock: format_clock(timer.time_remaining),
            next_break_mode: self.timer.next_break_mode()?,
            timer,
        })
    }

    /// Waits until every spawned remote mirror has finished.
    pub async fn wait_for_mirrors(&mut self) {
        while let Some(result) = self.mirrors.join_next().await {
            if let Err(error) = result {
                warn!(%error, "remote mirror task did not complete");
            }
        }
    }

    fn finish(&mut self) {
        self.notes.unbind();
        if let Err(error) = self.timer.switch_mode(TimerMode::Work) {
            warn!(%error, "failed to reset timer after session");
        }
        self.phase = SessionPhase::Idle;
    }

    fn spawn_mirror(&mut self, record: Record) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(record_id = %record.id, "no async runtime available; remote mirror skipped");
            return;
        };
        let remote = Arc::clone(&self.remote);
        let owner_id = self.owner_id.clone();
        let work_seconds = u64::from(self.settings.durations.work_seconds);
        while self.mirrors.try_join_next().is_some() {}
        self.mirrors.spawn_on(
            async move {
                if let Err(error) =
                    mirror_solved_record(remote.as_ref(), &owner_id, &record, work_seconds).await
                {
                    warn!(%error, record_id = %record.id, "remote mirror failed");
                } else {
                    debug!(record_id = %record.id, "record mirrored remotely");
                }
            },
            &runtime,
        );
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        if !self.mirrors.is_empty() {
            self.mirrors.detach_all();
        }
    }
}

pub fn total_time_spent(sessions_count: u32, work_seconds: u32) -> u64 {
    u64::from(sessions_count) * u64::from(work_seconds)
}

/// Replays a solved record onto the remote store under the same id.
///
/// Stops at the first failing call.
async fn mirror_solved_record(
    remote: &dyn RemoteRecordStore,
    owner_id: &str,
    record: &Record,
    work_seconds: u64,
) -> Result<(), InfraError> {
    remote
        .create(
            owner_id,
            &record.problem_name,
            record.difficulty,
            &record.notes,
            &record.id,
        )
        .await?;
    remote
        .mark_solved(
            &record.id,
            &SolvedUpdate {
                video_url: record.video_url.clone(),
            },
        )
        .await?;
    remote
        .update_time_spent(&record.id, record.total_time_spent)
        .await?;
    for _ in 0..record.sessions_count {
        remote.increment_session_count(&record.id).await?;
    }
    for _ in 0..record.sessions_count {
        remote
            .create_session_log(owner_id, &record.id, work_seconds, true)
            .await?;
    }
    Ok(())
}
