use crate::application::bootstrap::{BootstrapResult, bootstrap_workspace};
use crate::application::library::{Confirmation, DeleteOutcome, LibraryQuery, ProblemLibrary};
use crate::application::session::{SessionOrchestrator, SessionSettings, SessionSnapshot};
use crate::application::stats::{StatsSummary, summarize};
use crate::application::timer_driver::ScheduledEvent;
use crate::domain::models::{Difficulty, Record, RecordPatch, SolvedUpdate, TimerMode};
use crate::domain::timer::TimerEvent;
use crate::infrastructure::config::{AppConfig, RemoteConfig};
use crate::infrastructure::credential_store::{
    CredentialStore, KeyringCredentialStore, resolve_owner_id,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_record_store::LocalRecordStore;
use crate::infrastructure::notifier::{BellNotifier, Notifier};
use crate::infrastructure::remote_record_store::{
    InMemoryRemoteRecordStore, ReqwestRemoteRecordStore, RemoteRecordStore,
};
use crate::infrastructure::storage::SqliteKeyValueStore;
use crate::infrastructure::video_store::{InMemoryVideoStore, ReqwestVideoStore, VideoStore};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Collaborators the command layer is wired from.
pub struct AppServices {
    pub local: Arc<LocalRecordStore>,
    pub remote: Arc<dyn RemoteRecordStore>,
    pub videos: Arc<dyn VideoStore>,
    pub notifier: Arc<dyn Notifier>,
    pub owner_id: String,
}

pub struct AppState {
    workspace_root: PathBuf,
    database_path: PathBuf,
    config: AppConfig,
    timezone: Tz,
    owner_id: String,
    local: Arc<LocalRecordStore>,
    remote: Arc<dyn RemoteRecordStore>,
    videos: Arc<dyn VideoStore>,
    library: ProblemLibrary,
    session: Arc<AsyncMutex<SessionOrchestrator>>,
    event_pump: Option<JoinHandle<()>>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::open(
            &workspace_root,
            |key| std::env::var(key).ok(),
            &KeyringCredentialStore::default(),
            Arc::new(BellNotifier),
        )
    }

    /// Bootstraps `workspace_root` and wires the stores named by its config.
    pub fn open<F>(
        workspace_root: &Path,
        lookup: F,
        credentials: &dyn CredentialStore,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, InfraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bootstrap = bootstrap_workspace(workspace_root, lookup)?;
        let identity_token = match credentials.load_identity() {
            Ok(identity) => identity.and_then(|identity| identity.token),
            Err(error) => {
                warn!(%error, "failed to read remote identity token");
                None
            }
        };
        let owner_id = resolve_owner_id(credentials);
        let token = bootstrap.config.remote.token.clone().or(identity_token);

        let services = AppServices {
            local: Arc::new(LocalRecordStore::new(Arc::new(SqliteKeyValueStore::new(
                &bootstrap.database_path,
            )))),
            remote: remote_store(&bootstrap.config.remote, token.clone())?,
            videos: video_store(&bootstrap.config.remote, token)?,
            notifier,
            owner_id,
        };
        Self::with_services(bootstrap, services)
    }

    pub fn with_services(
        bootstrap: BootstrapResult,
        services: AppServices,
    ) -> Result<Self, InfraError> {
        let timezone = bootstrap
            .config
            .timezone
            .parse::<Tz>()
            .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone: {error}")))?;
        let (orchestrator, events) = SessionOrchestrator::new(
            SessionSettings::from_config(&bootstrap.config),
            services.owner_id.clone(),
            Arc::clone(&services.local),
            Arc::clone(&services.remote),
            services.notifier,
        );
        let session = Arc::new(AsyncMutex::new(orchestrator));
        let event_pump = spawn_event_pump(Arc::clone(&session), events);

        info!(
            workspace_root = %bootstrap.workspace_root.display(),
            owner_id = %services.owner_id,
            "app state initialized"
        );
        Ok(Self {
            workspace_root: bootstrap.workspace_root,
            database_path: bootstrap.database_path,
            config: bootstrap.config,
            timezone,
            owner_id: services.owner_id,
            library: ProblemLibrary::new(Arc::clone(&services.local), Arc::clone(&services.remote)),
            local: services.local,
            remote: services.remote,
            videos: services.videos,
            session,
            event_pump,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Waits for outstanding remote mirrors of solved records.
    pub async fn flush_remote(&self) {
        self.session.lock().await.wait_for_mirrors().await;
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        if let Some(pump) = self.event_pump.take() {
            pump.abort();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerEventResponse {
    pub event: String,
    pub session: SessionSnapshot,
}

pub async fn start_session_impl(
    state: &AppState,
    problem_name: String,
    difficulty: String,
) -> Result<SessionSnapshot, InfraError> {
    let difficulty = Difficulty::parse(&difficulty).map_err(InfraError::Validation)?;
    let mut session = state.session.lock().await;
    session.start_session(&problem_name, difficulty)?;
    session.snapshot()
}

pub async fn start_timer_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.session.lock().await;
    session.start_timer()?;
    session.snapshot()
}

pub async fn pause_timer_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.session.lock().await;
    session.pause_timer()?;
    session.snapshot()
}

pub async fn reset_timer_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.session.lock().await;
    session.reset_timer()?;
    session.snapshot()
}

pub async fn skip_timer_impl(state: &AppState) -> Result<TimerEventResponse, InfraError> {
    let mut session = state.session.lock().await;
    let event = session.skip_timer()?;
    Ok(TimerEventResponse {
        event: match event {
            TimerEvent::WorkCompleted { .. } => "workCompleted",
            TimerEvent::BreakElapsed { .. } => "breakElapsed",
        }
        .to_string(),
        session: session.snapshot()?,
    })
}

pub async fn switch_mode_impl(
    state: &AppState,
    mode: String,
) -> Result<SessionSnapshot, InfraError> {
    let mode = TimerMode::parse(&mode).map_err(InfraError::Validation)?;
    let mut session = state.session.lock().await;
    session.switch_mode(mode)?;
    session.snapshot()
}

pub async fn get_session_state_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    state.session.lock().await.snapshot()
}

pub async fn resolve_solved_impl(state: &AppState) -> Result<Record, InfraError> {
    state.session.lock().await.resolve_solved()
}

pub async fn resolve_keep_working_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.session.lock().await;
    session.resolve_keep_working()?;
    session.snapshot()
}

pub async fn update_notes_impl(
    state: &AppState,
    text: String,
) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.session.lock().await;
    session.update_notes(text)?;
    session.snapshot()
}

pub async fn end_session_impl(state: &AppState) -> Result<SessionSnapshot, InfraError> {
    let mut session = state.session.lock().await;
    session.end_session()?;
    session.snapshot()
}

pub fn list_records_impl(
    state: &AppState,
    query: Option<LibraryQuery>,
) -> Result<Vec<Record>, InfraError> {
    Ok(state.library.list(&query.unwrap_or_default()))
}

pub async fn delete_record_impl(
    state: &AppState,
    record_id: String,
    confirmed: bool,
) -> Result<DeleteOutcome, InfraError> {
    if record_id.trim().is_empty() {
        return Err(InfraError::Validation("record_id must not be empty".to_string()));
    }
    state
        .library
        .delete(&record_id, Confirmation::from(confirmed))
        .await
}

pub fn get_stats_impl(state: &AppState) -> Result<StatsSummary, InfraError> {
    let today = Utc::now().with_timezone(&state.timezone).date_naive();
    Ok(summarize(&state.local.list(), today, state.timezone))
}

/// Uploads an explanation video for a solved record and links it.
///
/// The local link is authoritative; the remote link is best-effort.
pub async fn attach_video_impl(
    state: &AppState,
    record_id: String,
    video: Vec<u8>,
) -> Result<Record, InfraError> {
    if video.is_empty() {
        return Err(InfraError::Validation("video must not be empty".to_string()));
    }
    if state.local.get(&record_id).is_none() {
        return Err(InfraError::NotFound(format!("record {record_id}")));
    }

    let video_url = state
        .videos
        .upload(&state.owner_id, &record_id, video)
        .await?;
    let patch = RecordPatch {
        video_url: Some(video_url.clone()),
        ..RecordPatch::default()
    };
    let updated = state
        .local
        .update(&record_id, &patch)?
        .ok_or_else(|| InfraError::NotFound(format!("record {record_id}")))?;

    let update = SolvedUpdate {
        video_url: Some(video_url),
    };
    if let Err(error) = state.remote.mark_solved(&record_id, &update).await {
        warn!(%error, record_id = %record_id, "failed to link video remotely");
    }
    Ok(updated)
}

fn remote_store(
    config: &RemoteConfig,
    token: Option<String>,
) -> Result<Arc<dyn RemoteRecordStore>, InfraError> {
    match config.base_url.as_deref() {
        Some(base_url) => Ok(Arc::new(ReqwestRemoteRecordStore::new(base_url, token)?)),
        None => {
            info!("no remote url configured; mirroring to process memory");
            Ok(Arc::new(InMemoryRemoteRecordStore::default()))
        }
    }
}

fn video_store(
    config: &RemoteConfig,
    token: Option<String>,
) -> Result<Arc<dyn VideoStore>, InfraError> {
    match config.video_base_url.as_deref() {
        Some(base_url) => Ok(Arc::new(ReqwestVideoStore::new(base_url, token)?)),
        None => Ok(Arc::new(InMemoryVideoStore::default())),
    }
}

fn spawn_event_pump(
    session: Arc<AsyncMutex<SessionOrchestrator>>,
    mut events: UnboundedReceiver<ScheduledEvent>,
) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("no async runtime available; timer completions will not be delivered");
        return None;
    };
    Some(runtime.spawn(async move {
        while let Some(event) = events.recv().await {
            let mut session = session.lock().await;
            if let Err(error) = session.handle_timer_event(event) {
                warn!(%error, ?event, "failed to handle timer event");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::library::SortOrder;
    use crate::application::session::SessionPhase;
    use crate::infrastructure::credential_store::{InMemoryCredentialStore, RemoteIdentity};
    use crate::infrastructure::notifier::LogNotifier;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomonotes-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn with_config(config: &AppConfig) -> Self {
            let workspace = Self::new();
            let config_dir = workspace.path.join("config");
            fs::create_dir_all(&config_dir).expect("create config dir");
            fs::write(
                config_dir.join("app.json"),
                serde_json::to_string_pretty(config).expect("serialize config"),
            )
            .expect("write config");
            workspace
        }

        fn app_state(&self) -> AppState {
            self.app_state_with(&InMemoryCredentialStore::default())
        }

        fn app_state_with(&self, credentials: &dyn CredentialStore) -> AppState {
            AppState::open(&self.path, |_| None, credentials, Arc::new(LogNotifier))
                .expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn bootstrap_creates_workspace_layout() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        assert!(workspace.path.join("config").join("app.json").exists());
        assert!(workspace.path.join("logs").is_dir());
        assert!(state.database_path().ends_with("state/pomonotes.sqlite"));
        assert!(state.database_path().exists());
        assert_eq!(state.owner_id(), "anonymous");
        assert_eq!(state.config().timer.durations.work_seconds, 1500);
    }

    #[tokio::test]
    async fn start_session_validates_name_and_difficulty() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let result = start_session_impl(&state, "   ".to_string(), "Easy".to_string()).await;
        assert!(matches!(result, Err(InfraError::Validation(_))));
        let result = start_session_impl(&state, "Two Sum".to_string(), "Trivial".to_string()).await;
        assert!(matches!(result, Err(InfraError::Validation(_))));

        let snapshot = get_session_state_impl(&state).await.expect("state");
        assert_eq!(snapshot.phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn solved_flow_persists_and_feeds_stats() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        let snapshot = start_session_impl(&state, "Two Sum".to_string(), "easy".to_string())
            .await
            .expect("start session");
        assert_eq!(snapshot.phase, SessionPhase::Active);
        assert_eq!(snapshot.clock, "25:00");

        update_notes_impl(&state, "one pass with a hash map".to_string())
            .await
            .expect("notes");
        let skipped = skip_timer_impl(&state).await.expect("skip");
        assert_eq!(skipped.event, "workCompleted");
        assert_eq!(skipped.session.phase, SessionPhase::AwaitingDecision);

        let record = resolve_solved_impl(&state).await.expect("solved");
        assert_eq!(record.notes, "one pass with a hash map");
        state.flush_remote().await;

        let records = list_records_impl(&state, None).expect("list");
        assert_eq!(records, vec![record]);

        let stats = get_stats_impl(&state).expect("stats");
        assert_eq!(stats.total_problems, 1);
        assert_eq!(stats.total_time_seconds, 1500);
        assert_eq!(stats.total_time_label, "25m");
        assert_eq!(stats.by_difficulty.easy, 1);
        assert_eq!(stats.current_streak, 1);
    }

    #[tokio::test]
    async fn keep_working_accumulates_cycles() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();

        start_session_impl(&state, "Merge Intervals".to_string(), "Medium".to_string())
            .await
            .expect("start session");
        skip_timer_impl(&state).await.expect("skip");
        let snapshot = resolve_keep_working_impl(&state).await.expect("keep working");
        assert_eq!(snapshot.sessions_count, 2);
        assert_eq!(snapshot.timer.mode, TimerMode::Work);
        assert!(list_records_impl(&state, None).expect("list").is_empty());

        skip_timer_impl(&state).await.expect("skip");
        let record = resolve_solved_impl(&state).await.expect("solved");
        assert_eq!(record.total_time_spent, 3000);
    }

    #[tokio::test]
    async fn records_survive_reopening_the_workspace() {
        let workspace = TempWorkspace::new();
        let record_id = {
            let state = workspace.app_state();
            start_session_impl(&state, "Two Sum".to_string(), "Easy".to_string())
                .await
                .expect("start session");
            skip_timer_impl(&state).await.expect("skip");
            resolve_solved_impl(&state).await.expect("solved").id
        };

        let reopened = workspace.app_state();
        let records = list_records_impl(
            &reopened,
            Some(LibraryQuery {
                search: Some("two".to_string()),
                difficulty: Some(Difficulty::Easy),
                sort: SortOrder::Name,
            }),
        )
        .expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record_id);
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        start_session_impl(&state, "Two Sum".to_string(), "Easy".to_string())
            .await
            .expect("start session");
        skip_timer_impl(&state).await.expect("skip");
        let record = resolve_solved_impl(&state).await.expect("solved");
        state.flush_remote().await;

        let declined = delete_record_impl(&state, record.id.clone(), false)
            .await
            .expect("declined delete");
        assert!(!declined.deleted_locally);
        assert_eq!(list_records_impl(&state, None).expect("list").len(), 1);

        let confirmed = delete_record_impl(&state, record.id.clone(), true)
            .await
            .expect("confirmed delete");
        assert!(confirmed.deleted_locally);
        assert!(confirmed.deleted_remotely);
        assert!(list_records_impl(&state, None).expect("list").is_empty());

        let again = delete_record_impl(&state, record.id, true)
            .await
            .expect("repeat delete");
        assert!(!again.deleted_locally);
    }

    #[tokio::test]
    async fn attach_video_links_record() {
        let workspace = TempWorkspace::new();
        let credentials = InMemoryCredentialStore::default();
        credentials
            .save_identity(&RemoteIdentity {
                user_id: "user-7".to_string(),
                token: None,
            })
            .expect("save identity");
        let state = workspace.app_state_with(&credentials);
        assert_eq!(state.owner_id(), "user-7");

        let missing = attach_video_impl(&state, "problem_0_missing".to_string(), vec![1]).await;
        assert!(matches!(missing, Err(InfraError::NotFound(_))));

        start_session_impl(&state, "Two Sum".to_string(), "Easy".to_string())
            .await
            .expect("start session");
        skip_timer_impl(&state).await.expect("skip");
        let record = resolve_solved_impl(&state).await.expect("solved");

        let updated = attach_video_impl(&state, record.id.clone(), vec![0x1a, 0x45])
            .await
            .expect("attach video");
        let expected = format!("memory://videos/user-7/{}/explanation.webm", record.id);
        assert_eq!(updated.video_url.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn natural_completion_reaches_the_decision_point() {
        let mut config = AppConfig::default();
        config.timer.durations.work_seconds = 3;
        let workspace = TempWorkspace::with_config(&config);
        let state = workspace.app_state();

        start_session_impl(&state, "Two Sum".to_string(), "Easy".to_string())
            .await
            .expect("start session");
        let running = start_timer_impl(&state).await.expect("start timer");
        assert!(running.timer.is_running);
        assert_eq!(running.clock, "00:03");

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let snapshot = get_session_state_impl(&state).await.expect("state");
        assert_eq!(snapshot.phase, SessionPhase::AwaitingDecision);
        assert_eq!(snapshot.timer.time_remaining, 0);
        assert_eq!(snapshot.timer.session_count, 1);

        let record = resolve_solved_impl(&state).await.expect("solved");
        assert_eq!(record.total_time_spent, 3);
    }

    #[tokio::test]
    async fn switch_mode_rejects_unknown_modes() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let snapshot = switch_mode_impl(&state, "longBreak".to_string())
            .await
            .expect("switch");
        assert_eq!(snapshot.timer.mode, TimerMode::LongBreak);
        assert_eq!(snapshot.clock, "15:00");

        let result = switch_mode_impl(&state, "siesta".to_string()).await;
        assert!(matches!(result, Err(InfraError::Validation(_))));

        let paused = pause_timer_impl(&state).await.expect("pause");
        assert!(!paused.timer.is_running);
        let reset = reset_timer_impl(&state).await.expect("reset");
        assert_eq!(reset.timer.time_remaining, 900);
        let ended = end_session_impl(&state).await.expect("end idle session");
        assert_eq!(ended.phase, SessionPhase::Idle);
    }
}
