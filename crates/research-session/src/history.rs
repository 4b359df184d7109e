//! Persisted snapshots of completed research sessions.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::HistoryError;
use crate::event::EventRecord;

/// Snapshot of a completed session. Read-only once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    pub ordered_events: Vec<EventRecord>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(question: &str, answer: &str, ordered_events: &[EventRecord]) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.to_string(),
            answer: answer.to_string(),
            ordered_events: ordered_events.to_vec(),
            created_at: Utc::now(),
        }
    }

    /// Duplicate check used by auto-save: same question and answer.
    pub fn matches(&self, question: &str, answer: &str) -> bool {
        self.question == question && self.answer == answer
    }
}

/// Storage for history entries. Implementations decide where entries live.
pub trait HistoryStore: Send + Sync {
    fn save(
        &self,
        question: &str,
        answer: &str,
        ordered_events: &[EventRecord],
    ) -> Result<HistoryEntry, HistoryError>;

    /// All entries, most recent first.
    fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError>;

    fn get(&self, id: Uuid) -> Result<Option<HistoryEntry>, HistoryError>;

    /// Returns whether an entry was removed.
    fn delete(&self, id: Uuid) -> Result<bool, HistoryError>;

    fn contains(&self, question: &str, answer: &str) -> Result<bool, HistoryError> {
        Ok(self
            .list()?
            .iter()
            .any(|entry| entry.matches(question, answer)))
    }
}

/// In-process history, lost when the process exits.
#[derive(Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn save(
        &self,
        question: &str,
        answer: &str,
        ordered_events: &[EventRecord],
    ) -> Result<HistoryEntry, HistoryError> {
        let entry = HistoryEntry::new(question, answer, ordered_events);
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        entries.insert(0, entry.clone());
        Ok(entry)
    }

    fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| HistoryError::Poisoned)?
            .clone())
    }

    fn get(&self, id: Uuid) -> Result<Option<HistoryEntry>, HistoryError> {
        let entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(entries.iter().find(|entry| entry.id == id).cloned())
    }

    fn delete(&self, id: Uuid) -> Result<bool, HistoryError> {
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        Ok(entries.len() != before)
    }
}

/// History persisted as a JSON array in a single file, most recent first.
///
/// Every operation re-reads the file, so several processes see each other's
/// entries. Writes go through a sibling temp file and a rename.
pub struct JsonFileHistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|source| HistoryError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let raw = serde_json::to_vec_pretty(entries).map_err(|source| HistoryError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

impl HistoryStore for JsonFileHistoryStore {
    fn save(
        &self,
        question: &str,
        answer: &str,
        ordered_events: &[EventRecord],
    ) -> Result<HistoryEntry, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        let mut entries = self.read()?;
        let entry = HistoryEntry::new(question, answer, ordered_events);
        entries.insert(0, entry.clone());
        self.write(&entries)?;
        tracing::debug!(id = %entry.id, path = %self.path.display(), "saved history entry");
        Ok(entry)
    }

    fn list(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        self.read()
    }

    fn get(&self, id: Uuid) -> Result<Option<HistoryEntry>, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(self.read()?.into_iter().find(|entry| entry.id == id))
    }

    fn delete(&self, id: Uuid) -> Result<bool, HistoryError> {
        let _guard = self.lock.lock().map_err(|_| HistoryError::Poisoned)?;
        let mut entries = self.read()?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&entries)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<EventRecord> {
        vec![
            EventRecord::question("what is rust?"),
            EventRecord::Report {
                output: "a language".into(),
            },
        ]
    }

    fn exercise_store(store: &dyn HistoryStore) {
        let first = store.save("q1", "a1", &events()).expect("save");
        let second = store.save("q2", "a2", &events()).expect("save");

        let listed = store.list().expect("list");
        assert_eq!(
            listed.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert_eq!(store.get(first.id).expect("get"), Some(first.clone()));
        assert!(store.contains("q1", "a1").expect("contains"));
        assert!(!store.contains("q1", "a2").expect("contains"));

        assert!(store.delete(first.id).expect("delete"));
        assert!(!store.delete(first.id).expect("delete again"));
        assert_eq!(store.get(first.id).expect("get"), None);
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn memory_store_lists_most_recent_first() {
        exercise_store(&MemoryHistoryStore::new());
    }

    #[test]
    fn file_store_lists_most_recent_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        exercise_store(&JsonFileHistoryStore::new(dir.path().join("h").join("history.json")));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.json");
        let saved = JsonFileHistoryStore::new(&path)
            .save("q", "a", &events())
            .expect("save");

        let reopened = JsonFileHistoryStore::new(&path);
        let entry = reopened.get(saved.id).expect("get").expect("present");
        assert_eq!(entry.ordered_events, events());
        assert_eq!(entry.created_at, saved.created_at);
    }

    #[test]
    fn missing_or_empty_file_is_empty_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.json");
        let store = JsonFileHistoryStore::new(&path);
        assert!(store.list().expect("list").is_empty());
        std::fs::write(&path, "  ").expect("write");
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").expect("write");
        let err = JsonFileHistoryStore::new(&path).list().expect_err("corrupt");
        assert!(matches!(err, HistoryError::Corrupt { .. }));
    }
}
