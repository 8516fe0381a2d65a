use crate::infrastructure::error::InfraError;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "pomonotes.log";

/// Installs the global subscriber writing to `<logs_dir>/pomonotes.log`.
///
/// Returns `Ok(false)` when a subscriber was already installed.
pub fn init_logging(logs_dir: &Path, level: &str) -> Result<bool, InfraError> {
    let filter = EnvFilter::try_new(level)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid log level '{level}': {error}")))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(LOG_FILE))?;

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .is_ok();
    Ok(installed)
}
