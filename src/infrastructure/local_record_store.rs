use crate::domain::models::{Record, RecordPatch};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::KeyValueStore;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, warn};

const RECORDS_KEY: &str = "pomonotes:problems";
const NOTES_KEY_PREFIX: &str = "pomonotes:notes:";

/// Write-through local cache of solved records plus per-problem note drafts.
///
/// This is the only writer of the `pomonotes:` namespace. `list` and `get`
/// degrade to an empty collection on an unreadable payload; the write paths
/// fail instead so a transient read error never overwrites stored records.
pub struct LocalRecordStore {
    backend: Arc<dyn KeyValueStore>,
    write_guard: Mutex<()>,
}

impl LocalRecordStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            write_guard: Mutex::new(()),
        }
    }

    pub fn notes_key(problem_name: &str) -> String {
        format!("{NOTES_KEY_PREFIX}{problem_name}")
    }

    /// Appends without an id uniqueness check.
    pub fn save(&self, record: &Record) -> Result<(), InfraError> {
        record.validate().map_err(InfraError::Validation)?;
        let _guard = self.lock_writes()?;
        let mut records = self.read_records_strict()?;
        records.push(record.clone());
        self.write_records(&records)?;
        debug!(record_id = %record.id, "saved record locally");
        Ok(())
    }

    /// Records in insertion order.
    pub fn list(&self) -> Vec<Record> {
        self.read_records()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.read_records().into_iter().find(|record| record.id == id)
    }

    /// Removes the first record with `id`; returns whether one was removed.
    pub fn delete(&self, id: &str) -> Result<bool, InfraError> {
        let _guard = self.lock_writes()?;
        let mut records = self.read_records_strict()?;
        let Some(index) = records.iter().position(|record| record.id == id) else {
            return Ok(false);
        };
        records.remove(index);
        self.write_records(&records)?;
        debug!(record_id = %id, "deleted record locally");
        Ok(true)
    }

    pub fn update(&self, id: &str, patch: &RecordPatch) -> Result<Option<Record>, InfraError> {
        let _guard = self.lock_writes()?;
        let mut records = self.read_records_strict()?;
        let Some(record) = records.iter_mut().find(|record| record.id == id) else {
            return Ok(None);
        };
        record.apply_patch(patch);
        let updated = record.clone();
        self.write_records(&records)?;
        Ok(Some(updated))
    }

    /// Note draft for `problem_name`, empty when none was saved or it is unreadable.
    pub fn load_notes(&self, problem_name: &str) -> String {
        match self.backend.get(&Self::notes_key(problem_name)) {
            Ok(value) => value.unwrap_or_default(),
            Err(error) => {
                warn!(%error, problem_name, "failed to read saved notes");
                String::new()
            }
        }
    }

    pub fn save_notes(&self, problem_name: &str, notes: &str) -> Result<(), InfraError> {
        let _guard = self.lock_writes()?;
        self.backend.set(&Self::notes_key(problem_name), notes)
    }

    pub fn clear_notes(&self, problem_name: &str) -> Result<(), InfraError> {
        let _guard = self.lock_writes()?;
        self.backend.remove(&Self::notes_key(problem_name))
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, InfraError> {
        self.write_guard
            .lock()
            .map_err(|error| InfraError::poisoned("local record store", error))
    }

    fn read_records(&self) -> Vec<Record> {
        match self.read_records_strict() {
            Ok(records) => records,
            Err(error) => {
                error!(%error, "failed to read local records; treating as empty");
                Vec::new()
            }
        }
    }

    fn read_records_strict(&self) -> Result<Vec<Record>, InfraError> {
        match self.backend.get(RECORDS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_records(&self, records: &[Record]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(records)?;
        self.backend.set(RECORDS_KEY, &payload)
    }
}
