use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ANONYMOUS_OWNER_ID: &str = "anonymous";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("difficulty must be one of Easy, Medium, Hard: '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    Work,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::ShortBreak => "shortBreak",
            Self::LongBreak => "longBreak",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        [Self::Work, Self::ShortBreak, Self::LongBreak]
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("timer mode must be work, shortBreak or longBreak: '{value}'"))
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Self::Work)
    }
}

/// A solved (or being-solved) practice problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub problem_name: String,
    pub difficulty: Difficulty,
    #[serde(default, alias = "textNotes")]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub date_started: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_solved: Option<DateTime<Utc>>,
    pub sessions_count: u32,
    pub total_time_spent: u64,
    pub created_at: DateTime<Utc>,
}

impl Record {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "record.id")?;
        validate_non_empty(&self.problem_name, "record.problem_name")?;
        if self.sessions_count == 0 {
            return Err("record.sessions_count must be >= 1".to_string());
        }
        if let Some(date_solved) = self.date_solved {
            if date_solved < self.date_started {
                return Err("record.date_solved must be >= record.date_started".to_string());
            }
        }
        Ok(())
    }

    pub fn is_solved(&self) -> bool {
        self.date_solved.is_some()
    }

    pub fn apply_patch(&mut self, patch: &RecordPatch) {
        if let Some(problem_name) = &patch.problem_name {
            self.problem_name = problem_name.clone();
        }
        if let Some(difficulty) = patch.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(notes) = &patch.notes {
            self.notes = notes.clone();
        }
        if let Some(video_url) = &patch.video_url {
            self.video_url = Some(video_url.clone());
        }
        if let Some(date_solved) = patch.date_solved {
            self.date_solved = Some(date_solved);
        }
        if let Some(sessions_count) = patch.sessions_count {
            self.sessions_count = sessions_count;
        }
        if let Some(total_time_spent) = patch.total_time_spent {
            self.total_time_spent = total_time_spent;
        }
    }
}

/// Partial update for a stored record; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub problem_name: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub notes: Option<String>,
    pub video_url: Option<String>,
    pub date_solved: Option<DateTime<Utc>>,
    pub sessions_count: Option<u32>,
    pub total_time_spent: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SolvedUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

/// One timer cycle as recorded in the remote `sessions` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub id: String,
    pub user_id: String,
    pub problem_id: String,
    pub date: DateTime<Utc>,
    pub duration: u64,
    pub completed: bool,
}

/// Collision-resistant record id: millisecond prefix plus random suffix.
pub fn generate_record_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("problem_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

pub fn normalize_problem_name(value: &str) -> Result<String, String> {
    validate_non_empty(value, "problem_name")?;
    Ok(value.trim().to_string())
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
