use crate::domain::timer::TimerDurations;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const APP_JSON: &str = "app.json";
const SUPPORTED_SCHEMA: u8 = 1;
const DEFAULT_AUTOSAVE_SECONDS: u64 = 30;

const REMOTE_URL_KEYS: [&str; 1] = ["POMONOTES_REMOTE_URL"];
const REMOTE_TOKEN_KEYS: [&str; 1] = ["POMONOTES_REMOTE_TOKEN"];
const VIDEO_URL_KEYS: [&str; 1] = ["POMONOTES_VIDEO_URL"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    #[serde(flatten)]
    pub durations: TimerDurations,
    #[serde(default)]
    pub auto_cadence: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesConfig {
    pub auto_save_seconds: u64,
}

impl NotesConfig {
    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    #[serde(default)]
    pub video_base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub schema: u8,
    pub app_name: String,
    pub timezone: String,
    pub log_level: String,
    pub timer: TimerConfig,
    pub notes: NotesConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            app_name: "PomoNotes".to_string(),
            timezone: "UTC".to_string(),
            log_level: "info".to_string(),
            timer: TimerConfig {
                durations: TimerDurations::default(),
                auto_cadence: false,
            },
            notes: NotesConfig {
                auto_save_seconds: DEFAULT_AUTOSAVE_SECONDS,
            },
            remote: RemoteConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.schema != SUPPORTED_SCHEMA {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported schema {}",
                self.schema
            )));
        }
        self.timer
            .durations
            .validate()
            .map_err(InfraError::InvalidConfig)?;
        if self.notes.auto_save_seconds == 0 {
            return Err(InfraError::InvalidConfig(
                "notes.auto_save_seconds must be > 0".to_string(),
            ));
        }
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone: {error}")))?;
        Ok(())
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

/// Reads `app.json` and layers remote settings from `lookup` on top.
pub fn load_config_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<AppConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = config_dir.join(APP_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != u64::from(SUPPORTED_SCHEMA) {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }

    let mut config: AppConfig = serde_json::from_value(parsed).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid {}: {error}", path.display()))
    })?;

    if let Some(base_url) = optional_lookup_value(&lookup, &REMOTE_URL_KEYS) {
        config.remote.base_url = Some(base_url);
    }
    if let Some(token) = optional_lookup_value(&lookup, &REMOTE_TOKEN_KEYS) {
        config.remote.token = Some(token);
    }
    if let Some(video_url) = optional_lookup_value(&lookup, &VIDEO_URL_KEYS) {
        config.remote.video_base_url = Some(video_url);
    }
    config.remote.base_url = normalized(config.remote.base_url.take());
    config.remote.video_base_url = normalized(config.remote.video_base_url.take());

    config.validate()?;
    Ok(config)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomonotes-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_config_roundtrips_through_disk() {
        let dir = TempConfigDir::new();
        ensure_default_config(&dir.path).expect("write defaults");
        let config = load_config_with_lookup(&dir.path, |_| None).expect("load config");

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.timer.durations.work_seconds, 1500);
        assert_eq!(config.timer.durations.sessions_until_long_break, 4);
        assert!(!config.timer.auto_cadence);
        assert_eq!(config.notes.auto_save_interval(), Duration::from_secs(30));
    }

    #[test]
    fn ensure_default_config_keeps_existing_file() {
        let dir = TempConfigDir::new();
        let mut custom = AppConfig::default();
        custom.timezone = "Asia/Tokyo".to_string();
        fs::write(
            dir.path.join(APP_JSON),
            serde_json::to_string_pretty(&custom).expect("serialize"),
        )
        .expect("write custom");

        ensure_default_config(&dir.path).expect("ensure defaults");
        let config = load_config_with_lookup(&dir.path, |_| None).expect("load config");
        assert_eq!(config.timezone, "Asia/Tokyo");
    }

    #[test]
    fn lookup_overrides_remote_settings() {
        let dir = TempConfigDir::new();
        ensure_default_config(&dir.path).expect("write defaults");
        let config = load_config_with_lookup(&dir.path, |key| match key {
            "POMONOTES_REMOTE_URL" => Some(" https://docs.example/api ".to_string()),
            "POMONOTES_REMOTE_TOKEN" => Some("secret".to_string()),
            _ => None,
        })
        .expect("load config");

        assert_eq!(config.remote.base_url.as_deref(), Some("https://docs.example/api"));
        assert_eq!(config.remote.token.as_deref(), Some("secret"));
        assert!(config.remote.video_base_url.is_none());
    }

    #[test]
    fn rejects_unsupported_schema() {
        let dir = TempConfigDir::new();
        fs::write(dir.path.join(APP_JSON), "{\"schema\": 2}").expect("write");
        match load_config_with_lookup(&dir.path, |_| None) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("schema")),
            other => panic!("expected invalid config error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_durations_and_bad_timezone() {
        let mut config = AppConfig::default();
        config.timer.durations.work_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }
}
