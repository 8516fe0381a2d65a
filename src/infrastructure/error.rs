use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Remote store error: {0}")]
    Remote(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl InfraError {
    pub(crate) fn poisoned(what: &str, error: impl std::fmt::Display) -> Self {
        InfraError::InvalidState(format!("{what} lock poisoned: {error}"))
    }
}
