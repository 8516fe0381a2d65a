use crate::application::timer_driver::TickScheduler;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::local_record_store::LocalRecordStore;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Scratch notes for the active problem, auto-saved while non-empty.
///
/// Drafts are keyed by problem name so an abandoned session can be resumed by
/// starting again with the same name.
pub struct NotesBuffer {
    store: Arc<LocalRecordStore>,
    problem_name: Option<String>,
    text: Arc<Mutex<String>>,
    autosave: TickScheduler,
}

impl NotesBuffer {
    pub fn new(store: Arc<LocalRecordStore>, autosave_interval: Duration) -> Self {
        Self {
            store,
            problem_name: None,
            text: Arc::new(Mutex::new(String::new())),
            autosave: TickScheduler::new(autosave_interval),
        }
    }

    /// Binds the buffer to `problem_name` and restores its saved draft.
    pub fn bind(&mut self, problem_name: &str) -> String {
        self.autosave.cancel();
        let restored = self.store.load_notes(problem_name);
        self.problem_name = Some(problem_name.to_string());
        self.replace_text(&restored);
        self.restart_autosave();
        restored
    }

    pub fn get(&self) -> String {
        self.text
            .lock()
            .map(|text| text.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Updates the in-memory draft; persistence is left to the auto-save task.
    pub fn set(&mut self, text: impl Into<String>) {
        self.replace_text(&text.into());
        self.restart_autosave();
    }

    pub fn is_autosaving(&self) -> bool {
        self.autosave.is_active()
    }

    /// Stops auto-saving, empties the draft and removes its persisted copy for
    /// the bound problem.
    pub fn discard_saved(&mut self) -> Result<(), InfraError> {
        self.autosave.cancel();
        // Waits out an auto-save already holding the text.
        self.replace_text("");
        match self.problem_name.as_deref() {
            Some(problem_name) => self.store.clear_notes(problem_name),
            None => Ok(()),
        }
    }

    /// Stops auto-saving and forgets the in-memory draft. The persisted draft
    /// stays as last saved.
    pub fn unbind(&mut self) {
        self.autosave.cancel();
        self.problem_name = None;
        self.replace_text("");
    }

    fn replace_text(&self, value: &str) {
        let mut text = self
            .text
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        text.clear();
        text.push_str(value);
    }

    fn restart_autosave(&mut self) {
        self.autosave.cancel();
        let Some(problem_name) = self.problem_name.clone() else {
            return;
        };
        if self.get().is_empty() {
            return;
        }

        let store = Arc::clone(&self.store);
        let text = Arc::clone(&self.text);
        self.autosave.schedule(move || {
            let Ok(snapshot) = text.lock() else {
                return ControlFlow::Break(());
            };
            if snapshot.is_empty() {
                return ControlFlow::Break(());
            }
            match store.save_notes(&problem_name, &snapshot) {
                Ok(()) => debug!(problem_name = %problem_name, "notes auto-saved"),
                Err(error) => warn!(%error, problem_name = %problem_name, "notes auto-save failed"),
            }
            ControlFlow::Continue(())
        });
    }
}

impl Drop for NotesBuffer {
    fn drop(&mut self) {
        self.autosave.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryKeyValueStore;

    const INTERVAL: Duration = Duration::from_secs(30);

    fn buffer() -> (NotesBuffer, Arc<LocalRecordStore>) {
        let store = Arc::new(LocalRecordStore::new(Arc::new(
            InMemoryKeyValueStore::default(),
        )));
        (NotesBuffer::new(Arc::clone(&store), INTERVAL), store)
    }

    #[tokio::test(start_paused = true)]
    async fn autosaves_after_interval_while_non_empty() {
        let (mut notes, store) = buffer();
        assert_eq!(notes.bind("Two Sum"), "");
        assert!(!notes.is_autosaving());

        notes.set("use a hash map");
        assert!(notes.is_autosaving());
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(store.load_notes("Two Sum"), "");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.load_notes("Two Sum"), "use a hash map");
    }

    #[tokio::test(start_paused = true)]
    async fn editing_restarts_the_autosave_window() {
        let (mut notes, store) = buffer();
        notes.bind("Two Sum");
        notes.set("a");
        tokio::time::sleep(Duration::from_secs(20)).await;
        notes.set("ab");
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(store.load_notes("Two Sum"), "");

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.load_notes("Two Sum"), "ab");
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_notes_cancels_autosave() {
        let (mut notes, store) = buffer();
        notes.bind("Two Sum");
        notes.set("draft");
        notes.set("");
        assert!(!notes.is_autosaving());

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(store.load_notes("Two Sum"), "");
    }

    #[tokio::test(start_paused = true)]
    async fn bind_restores_saved_draft_and_unbind_keeps_it() {
        let (mut notes, store) = buffer();
        store.save_notes("Merge Intervals", "sort by start").expect("seed notes");

        assert_eq!(notes.bind("Merge Intervals"), "sort by start");
        assert_eq!(notes.get(), "sort by start");
        assert!(notes.is_autosaving());

        notes.set("sort by start, then merge");
        notes.unbind();
        assert_eq!(notes.get(), "");
        assert!(!notes.is_autosaving());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.load_notes("Merge Intervals"), "sort by start");
    }

    #[tokio::test]
    async fn discard_targets_only_the_bound_problem() {
        let (mut notes, store) = buffer();
        store.save_notes("Two Sum", "complements").expect("seed");
        store.save_notes("Three Sum", "sort first").expect("seed");
        notes.discard_saved().expect("discard while unbound is a no-op");

        notes.bind("Two Sum");
        notes.discard_saved().expect("discard");
        assert_eq!(store.load_notes("Two Sum"), "");
        assert_eq!(store.load_notes("Three Sum"), "sort first");
    }

    #[tokio::test(start_paused = true)]
    async fn discard_stops_autosave_from_rewriting_the_draft() {
        let (mut notes, store) = buffer();
        notes.bind("Two Sum");
        notes.set("complements");
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.load_notes("Two Sum"), "complements");

        notes.discard_saved().expect("discard");
        assert!(!notes.is_autosaving());
        assert_eq!(notes.get(), "");
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(store.load_notes("Two Sum"), "");
    }
}
