use crate::domain::models::{Difficulty, Record};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_record_store::LocalRecordStore;
use crate::infrastructure::remote_record_store::RemoteRecordStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Recent,
    Name,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

impl From<bool> for Confirmation {
    fn from(confirmed: bool) -> Self {
        if confirmed { Self::Confirmed } else { Self::Declined }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted_locally: bool,
    pub deleted_remotely: bool,
}

/// Read side of the solved-problem list plus confirmed deletion.
pub struct ProblemLibrary {
    local: Arc<LocalRecordStore>,
    remote: Arc<dyn RemoteRecordStore>,
}

impl ProblemLibrary {
    pub fn new(local: Arc<LocalRecordStore>, remote: Arc<dyn RemoteRecordStore>) -> Self {
        Self { local, remote }
    }

    pub fn list(&self, query: &LibraryQuery) -> Vec<Record> {
        apply_query(self.local.list(), query)
    }

    /// Deletes locally, then remotely on a best-effort basis.
    ///
    /// A declined confirmation leaves both stores untouched.
    pub async fn delete(
        &self,
        id: &str,
        confirmation: Confirmation,
    ) -> Result<DeleteOutcome, InfraError> {
        if confirmation == Confirmation::Declined {
            return Ok(DeleteOutcome {
                deleted_locally: false,
                deleted_remotely: false,
            });
        }

        let deleted_locally = self.local.delete(id)?;
        let deleted_remotely = match self.remote.delete(id).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%error, record_id = %id, "remote delete failed; local delete kept");
                false
            }
        };
        info!(record_id = %id, deleted_locally, deleted_remotely, "record deleted");
        Ok(DeleteOutcome {
            deleted_locally,
            deleted_remotely,
        })
    }
}

pub fn apply_query(records: Vec<Record>, query: &LibraryQuery) -> Vec<Record> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase);

    let mut filtered = records
        .into_iter()
        .filter(|record| {
            needle
                .as_deref()
                .is_none_or(|needle| record.problem_name.to_lowercase().contains(needle))
        })
        .filter(|record| {
            query
                .difficulty
                .is_none_or(|difficulty| record.difficulty == difficulty)
        })
        .collect::<Vec<_>>();

    match query.sort {
        SortOrder::Recent => filtered.sort_by(compare_recent),
        SortOrder::Name => filtered.sort_by(|left, right| {
            left.problem_name
                .to_lowercase()
                .cmp(&right.problem_name.to_lowercase())
        }),
    }
    filtered
}

fn compare_recent(left: &Record, right: &Record) -> Ordering {
    match (left.date_solved, right.date_solved) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => right.created_at.cmp(&left.created_at),
    }
}
