use crate::domain::models::{Difficulty, Record, SessionLog, SolvedUpdate};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use url::Url;
use uuid::Uuid;

const PROBLEMS_COLLECTION: &str = "problems";
const SESSIONS_COLLECTION: &str = "sessions";

/// Network-backed mirror of the local record store.
///
/// Counter updates are read-then-write; concurrent writers may lose updates.
#[async_trait]
pub trait RemoteRecordStore: Send + Sync {
    async fn create(
        &self,
        user_id: &str,
        problem_name: &str,
        difficulty: Difficulty,
        notes: &str,
        explicit_id: &str,
    ) -> Result<String, InfraError>;

    async fn update_notes(&self, id: &str, notes: &str) -> Result<(), InfraError>;

    async fn mark_solved(&self, id: &str, update: &SolvedUpdate) -> Result<(), InfraError>;

    async fn increment_session_count(&self, id: &str) -> Result<(), InfraError>;

    async fn update_time_spent(&self, id: &str, delta_seconds: u64) -> Result<(), InfraError>;

    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<Record>, InfraError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, InfraError>;

    async fn delete(&self, id: &str) -> Result<(), InfraError>;

    async fn create_session_log(
        &self,
        user_id: &str,
        problem_id: &str,
        duration_seconds: u64,
        completed: bool,
    ) -> Result<String, InfraError>;

    async fn get_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionLog>, InfraError>;

    async fn get_sessions_for_problem(&self, problem_id: &str)
    -> Result<Vec<SessionLog>, InfraError>;
}

/// Remote `problems` document: a record plus its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ProblemDocument {
    user_id: String,
    #[serde(flatten)]
    record: Record,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateProblemRequest<'a> {
    user_id: &'a str,
    problem_name: &'a str,
    difficulty: Difficulty,
    notes: &'a str,
    video_url: Option<&'a str>,
    date_started: DateTime<Utc>,
    date_solved: Option<DateTime<Utc>>,
    sessions_count: u32,
    total_time_spent: u64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotesPatch<'a> {
    notes: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolvedPatch<'a> {
    date_solved: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionsCountPatch {
    sessions_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeSpentPatch {
    total_time_spent: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    user_id: &'a str,
    problem_id: &'a str,
    date: DateTime<Utc>,
    duration: u64,
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse<T> {
    #[serde(default = "Vec::new")]
    documents: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct ReqwestRemoteRecordStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ReqwestRemoteRecordStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, InfraError> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid remote base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "remote base url cannot be a base".to_string(),
            ));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token: token.filter(|value| !value.trim().is_empty()),
        })
    }

    fn collection_endpoint(&self, collection: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(collection)
            .map_err(|error| InfraError::Remote(format!("invalid collection url: {error}")))
    }

    fn document_endpoint(&self, collection: &str, id: &str) -> Result<Url, InfraError> {
        if id.trim().is_empty() {
            return Err(InfraError::Remote("document id must not be empty".to_string()));
        }
        let mut url = self.collection_endpoint(collection)?;
        url.path_segments_mut()
            .map_err(|_| InfraError::Remote("collection url cannot be a base".to_string()))?
            .push(id);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn http_error(context: &str, status: StatusCode, body: &str) -> InfraError {
        if body.trim().is_empty() {
            InfraError::Remote(format!("{context}: http {}", status.as_u16()))
        } else {
            InfraError::Remote(format!("{context}: http {}; body={body}", status.as_u16()))
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|error| InfraError::Remote(format!("network error while {context}: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Remote(format!("failed reading response while {context}: {error}")))?;
        Ok((status, body))
    }

    async fn send_expecting_success(
        &self,
        builder: RequestBuilder,
        context: &str,
    ) -> Result<String, InfraError> {
        let (status, body) = self.send(builder, context).await?;
        if !status.is_success() {
            return Err(Self::http_error(context, status, &body));
        }
        Ok(body)
    }

    async fn patch_problem<T: Serialize + Sync>(
        &self,
        id: &str,
        patch: &T,
        context: &str,
    ) -> Result<(), InfraError> {
        let url = self.document_endpoint(PROBLEMS_COLLECTION, id)?;
        self.send_expecting_success(self.client.patch(url).json(patch), context)
            .await?;
        Ok(())
    }

    async fn fetch_problem(&self, id: &str) -> Result<Option<Record>, InfraError> {
        let url = self.document_endpoint(PROBLEMS_COLLECTION, id)?;
        let (status, body) = self.send(self.client.get(url), "fetching problem").await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::http_error("fetching problem", status, &body));
        }
        let document: ProblemDocument = serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid problem payload: {error}; body={body}"))
        })?;
        Ok(Some(document.record))
    }

    async fn query_sessions(&self, field: &str, value: &str) -> Result<Vec<SessionLog>, InfraError> {
        let url = self.collection_endpoint(SESSIONS_COLLECTION)?;
        let body = self
            .send_expecting_success(
                self.client
                    .get(url)
                    .query(&[(field, value), ("orderBy", "date"), ("direction", "desc")]),
                "listing sessions",
            )
            .await?;
        let parsed: DocumentsResponse<SessionLog> = serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid sessions payload: {error}; body={body}"))
        })?;
        let mut sessions = parsed.documents;
        sessions.sort_by(|left, right| right.date.cmp(&left.date));
        Ok(sessions)
    }
}

#[async_trait]
impl RemoteRecordStore for ReqwestRemoteRecordStore {
    async fn create(
        &self,
        user_id: &str,
        problem_name: &str,
        difficulty: Difficulty,
        notes: &str,
        explicit_id: &str,
    ) -> Result<String, InfraError> {
        let url = self.document_endpoint(PROBLEMS_COLLECTION, explicit_id)?;
        let now = Utc::now();
        let request = CreateProblemRequest {
            user_id,
            problem_name,
            difficulty,
            notes,
            video_url: None,
            date_started: now,
            date_solved: None,
            sessions_count: 0,
            total_time_spent: 0,
            created_at: now,
        };
        self.send_expecting_success(self.client.put(url).json(&request), "creating problem")
            .await?;
        Ok(explicit_id.to_string())
    }

    async fn update_notes(&self, id: &str, notes: &str) -> Result<(), InfraError> {
        self.patch_problem(id, &NotesPatch { notes }, "updating notes")
            .await
    }

    async fn mark_solved(&self, id: &str, update: &SolvedUpdate) -> Result<(), InfraError> {
        let patch = SolvedPatch {
            date_solved: Utc::now(),
            video_url: update.video_url.as_deref().filter(|url| !url.trim().is_empty()),
        };
        self.patch_problem(id, &patch, "marking problem solved").await
    }

    async fn increment_session_count(&self, id: &str) -> Result<(), InfraError> {
        let current = self
            .fetch_problem(id)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("remote problem {id}")))?;
        let patch = SessionsCountPatch {
            sessions_count: current.sessions_count.saturating_add(1),
        };
        self.patch_problem(id, &patch, "incrementing session count")
            .await
    }

    async fn update_time_spent(&self, id: &str, delta_seconds: u64) -> Result<(), InfraError> {
        let current = self
            .fetch_problem(id)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("remote problem {id}")))?;
        let patch = TimeSpentPatch {
            total_time_spent: current.total_time_spent.saturating_add(delta_seconds),
        };
        self.patch_problem(id, &patch, "updating time spent").await
    }

    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<Record>, InfraError> {
        let url = self.collection_endpoint(PROBLEMS_COLLECTION)?;
        let body = self
            .send_expecting_success(
                self.client.get(url).query(&[
                    ("userId", user_id),
                    ("orderBy", "createdAt"),
                    ("direction", "desc"),
                ]),
                "listing problems",
            )
            .await?;
        let parsed: DocumentsResponse<ProblemDocument> =
            serde_json::from_str(&body).map_err(|error| {
                InfraError::Remote(format!("invalid problems payload: {error}; body={body}"))
            })?;
        let mut records: Vec<Record> = parsed
            .documents
            .into_iter()
            .filter(|document| document.user_id == user_id)
            .map(|document| document.record)
            .collect();
        records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(records)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, InfraError> {
        self.fetch_problem(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), InfraError> {
        let url = self.document_endpoint(PROBLEMS_COLLECTION, id)?;
        let (status, body) = self.send(self.client.delete(url), "deleting problem").await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::http_error("deleting problem", status, &body))
    }

    async fn create_session_log(
        &self,
        user_id: &str,
        problem_id: &str,
        duration_seconds: u64,
        completed: bool,
    ) -> Result<String, InfraError> {
        let url = self.collection_endpoint(SESSIONS_COLLECTION)?;
        let request = CreateSessionRequest {
            user_id,
            problem_id,
            date: Utc::now(),
            duration: duration_seconds,
            completed,
        };
        let body = self
            .send_expecting_success(self.client.post(url).json(&request), "creating session")
            .await?;
        let created: CreatedResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid create session payload: {error}; body={body}"))
        })?;
        Ok(created.id)
    }

    async fn get_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionLog>, InfraError> {
        self.query_sessions("userId", user_id).await
    }

    async fn get_sessions_for_problem(
        &self,
        problem_id: &str,
    ) -> Result<Vec<SessionLog>, InfraError> {
        self.query_sessions("problemId", problem_id).await
    }
}

#[derive(Debug, Default)]
struct InMemoryRemoteState {
    problems: HashMap<String, ProblemDocument>,
    sessions: Vec<SessionLog>,
}

/// Process-local remote store, used when no remote endpoint is configured.
#[derive(Debug, Default)]
pub struct InMemoryRemoteRecordStore {
    state: Mutex<InMemoryRemoteState>,
}

impl InMemoryRemoteRecordStore {
    fn with_state<T>(
        &self,
        action: impl FnOnce(&mut InMemoryRemoteState) -> Result<T, InfraError>,
    ) -> Result<T, InfraError> {
        let mut state = self
            .state
            .lock()
            .map_err(|error| InfraError::poisoned("in-memory remote store", error))?;
        action(&mut state)
    }

    fn with_problem(
        &self,
        id: &str,
        action: impl FnOnce(&mut Record),
    ) -> Result<(), InfraError> {
        self.with_state(|state| {
            let document = state
                .problems
                .get_mut(id)
                .ok_or_else(|| InfraError::NotFound(format!("remote problem {id}")))?;
            action(&mut document.record);
            Ok(())
        })
    }
}

#[async_trait]
impl RemoteRecordStore for InMemoryRemoteRecordStore {
    async fn create(
        &self,
        user_id: &str,
        problem_name: &str,
        difficulty: Difficulty,
        notes: &str,
        explicit_id: &str,
    ) -> Result<String, InfraError> {
        if explicit_id.trim().is_empty() {
            return Err(InfraError::Remote("document id must not be empty".to_string()));
        }
        let now = Utc::now();
        let document = ProblemDocument {
            user_id: user_id.to_string(),
            record: Record {
                id: explicit_id.to_string(),
                problem_name: problem_name.to_string(),
                difficulty,
                notes: notes.to_string(),
                video_url: None,
                date_started: now,
                date_solved: None,
                sessions_count: 0,
                total_time_spent: 0,
                created_at: now,
            },
        };
        self.with_state(|state| {
            state.problems.insert(explicit_id.to_string(), document);
            Ok(explicit_id.to_string())
        })
    }

    async fn update_notes(&self, id: &str, notes: &str) -> Result<(), InfraError> {
        self.with_problem(id, |record| record.notes = notes.to_string())
    }

    async fn mark_solved(&self, id: &str, update: &SolvedUpdate) -> Result<(), InfraError> {
        self.with_problem(id, |record| {
            record.date_solved = Some(Utc::now());
            if let Some(video_url) = update.video_url.as_deref().filter(|url| !url.is_empty()) {
                record.video_url = Some(video_url.to_string());
            }
        })
    }

    async fn increment_session_count(&self, id: &str) -> Result<(), InfraError> {
        self.with_problem(id, |record| {
            record.sessions_count = record.sessions_count.saturating_add(1)
        })
    }

    async fn update_time_spent(&self, id: &str, delta_seconds: u64) -> Result<(), InfraError> {
        self.with_problem(id, |record| {
            record.total_time_spent = record.total_time_spent.saturating_add(delta_seconds)
        })
    }

    async fn get_all_for_user(&self, user_id: &str) -> Result<Vec<Record>, InfraError> {
        self.with_state(|state| {
            let mut records: Vec<Record> = state
                .problems
                .values()
                .filter(|document| document.user_id == user_id)
                .map(|document| document.record.clone())
                .collect();
            records.sort_by(|left, right| right.created_at.cmp(&left.created_at));
            Ok(records)
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, InfraError> {
        self.with_state(|state| Ok(state.problems.get(id).map(|document| document.record.clone())))
    }

    async fn delete(&self, id: &str) -> Result<(), InfraError> {
        self.with_state(|state| {
            state.problems.remove(id);
            Ok(())
        })
    }

    async fn create_session_log(
        &self,
        user_id: &str,
        problem_id: &str,
        duration_seconds: u64,
        completed: bool,
    ) -> Result<String, InfraError> {
        let log = SessionLog {
            id: format!("session_{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            problem_id: problem_id.to_string(),
            date: Utc::now(),
            duration: duration_seconds,
            completed,
        };
        self.with_state(|state| {
            let id = log.id.clone();
            state.sessions.push(log);
            Ok(id)
        })
    }

    async fn get_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionLog>, InfraError> {
        self.with_state(|state| {
            Ok(sorted_sessions(
                state.sessions.iter().filter(|log| log.user_id == user_id),
            ))
        })
    }

    async fn get_sessions_for_problem(
        &self,
        problem_id: &str,
    ) -> Result<Vec<SessionLog>, InfraError> {
        self.with_state(|state| {
            Ok(sorted_sessions(
                state.sessions.iter().filter(|log| log.problem_id == problem_id),
            ))
        })
    }
}

fn sorted_sessions<'a>(logs: impl Iterator<Item = &'a SessionLog>) -> Vec<SessionLog> {
    let mut logs: Vec<SessionLog> = logs.cloned().collect();
    logs.sort_by(|left, right| right.date.cmp(&left.date));
    logs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_uses_explicit_id_and_counters_accumulate() {
        let store = InMemoryRemoteRecordStore::default();
        let id = store
            .create("user-1", "Two Sum", Difficulty::Easy, "notes", "problem_1_abc")
            .await
            .expect("create");
        assert_eq!(id, "problem_1_abc");

        store.increment_session_count(&id).await.expect("increment");
        store.increment_session_count(&id).await.expect("increment");
        store.update_time_spent(&id, 1500).await.expect("time");
        store.update_time_spent(&id, 1500).await.expect("time");
        store
            .mark_solved(
                &id,
                &SolvedUpdate {
                    video_url: Some("https://videos.example/x.webm".to_string()),
                },
            )
            .await
            .expect("mark solved");
        store.update_notes(&id, "revised").await.expect("notes");

        let record = store.get_by_id(&id).await.expect("get").expect("exists");
        assert_eq!(record.sessions_count, 2);
        assert_eq!(record.total_time_spent, 3000);
        assert!(record.date_solved.is_some());
        assert_eq!(record.video_url.as_deref(), Some("https://videos.example/x.webm"));
        assert_eq!(record.notes, "revised");
    }

    #[tokio::test]
    async fn counters_on_missing_document_report_not_found() {
        let store = InMemoryRemoteRecordStore::default();
        assert!(matches!(
            store.increment_session_count("missing").await,
            Err(InfraError::NotFound(_))
        ));
        assert!(store.get_by_id("missing").await.expect("get").is_none());
        store.delete("missing").await.expect("delete missing is ok");
    }

    #[tokio::test]
    async fn queries_are_scoped_by_owner_and_problem() {
        let store = InMemoryRemoteRecordStore::default();
        store
            .create("alice", "Two Sum", Difficulty::Easy, "", "p-a")
            .await
            .expect("create");
        store
            .create("bob", "Word Ladder", Difficulty::Hard, "", "p-b")
            .await
            .expect("create");
        store
            .create_session_log("alice", "p-a", 1500, true)
            .await
            .expect("session");
        store
            .create_session_log("bob", "p-b", 1500, true)
            .await
            .expect("session");
        store
            .create_session_log("bob", "p-b", 1500, false)
            .await
            .expect("session");

        let alice = store.get_all_for_user("alice").await.expect("list");
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, "p-a");

        let bob_sessions = store.get_sessions_for_user("bob").await.expect("sessions");
        assert_eq!(bob_sessions.len(), 2);
        assert!(bob_sessions[0].date >= bob_sessions[1].date);
        assert_eq!(
            store.get_sessions_for_problem("p-a").await.expect("sessions").len(),
            1
        );

        store.delete("p-b").await.expect("delete");
        assert!(store.get_all_for_user("bob").await.expect("list").is_empty());
    }

    #[test]
    fn reqwest_store_builds_escaped_document_urls() {
        let store = ReqwestRemoteRecordStore::new("https://docs.example/api/v1", None)
            .expect("valid base url");
        let url = store
            .document_endpoint(PROBLEMS_COLLECTION, "problem 1/x")
            .expect("document url");
        assert_eq!(
            url.as_str(),
            "https://docs.example/api/v1/problems/problem%201%2Fx"
        );
        assert_eq!(
            store
                .collection_endpoint(SESSIONS_COLLECTION)
                .expect("collection url")
                .as_str(),
            "https://docs.example/api/v1/sessions"
        );
        assert!(store.document_endpoint(PROBLEMS_COLLECTION, " ").is_err());
    }

    #[test]
    fn reqwest_store_rejects_invalid_base_url() {
        assert!(matches!(
            ReqwestRemoteRecordStore::new("not a url", None),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn problem_document_flattens_owner_into_record_fields() {
        let raw = serde_json::json!({
            "userId": "alice",
            "id": "p-a",
            "problemName": "Two Sum",
            "difficulty": "Easy",
            "notes": "",
            "dateStarted": "2026-02-16T09:00:00Z",
            "sessionsCount": 1,
            "totalTimeSpent": 1500,
            "createdAt": "2026-02-16T09:25:00Z"
        });
        let document: ProblemDocument = serde_json::from_value(raw).expect("parse document");
        assert_eq!(document.user_id, "alice");
        assert_eq!(document.record.problem_name, "Two Sum");
        assert!(document.record.date_solved.is_none());
    }
}
