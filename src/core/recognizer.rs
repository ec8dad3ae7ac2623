//! Change recognizers.
//!
//! A recognizer compares two snapshots of the same directory and classifies
//! the difference into [`FileEvent`]s. The monitor runs every registered
//! recognizer against the same pair and concatenates their output in
//! registration order.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::events::{FileEvent, FileEventKind};
use super::snapshot::{FileKey, Snapshot};

pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Classify the change from `before` to `after`.
    fn recognize(&self, before: &Snapshot, after: &Snapshot) -> Vec<FileEvent>;

    /// Drop any history kept for `directory`. Called when the directory stops
    /// being monitored.
    fn forget(&self, _directory: &Path) {}
}

/// Created, Modified and Deleted, in that order.
pub fn default_recognizers() -> Vec<Arc<dyn Recognizer>> {
    vec![
        Arc::new(CreatedRecognizer),
        Arc::new(ModifiedRecognizer),
        Arc::new(DeletedRecognizer),
    ]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CreatedRecognizer;

impl Recognizer for CreatedRecognizer {
    fn name(&self) -> &str {
        "created"
    }

    fn recognize(&self, before: &Snapshot, after: &Snapshot) -> Vec<FileEvent> {
        after
            .iter()
            .filter(|(key, _)| !before.contains(key))
            .map(|(_, record)| FileEvent::for_record(FileEventKind::Created, record, after))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ModifiedRecognizer;

impl Recognizer for ModifiedRecognizer {
    fn name(&self) -> &str {
        "modified"
    }

    fn recognize(&self, before: &Snapshot, after: &Snapshot) -> Vec<FileEvent> {
        after
            .iter()
            .filter_map(|(key, record)| {
                let previous = before.get(key)?;
                if previous.size != record.size || previous.modified != record.modified {
                    Some(FileEvent::for_record(FileEventKind::Modified, record, after))
                } else {
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeletedRecognizer;

impl Recognizer for DeletedRecognizer {
    fn name(&self) -> &str {
        "deleted"
    }

    fn recognize(&self, before: &Snapshot, after: &Snapshot) -> Vec<FileEvent> {
        before
            .iter()
            .filter(|(key, _)| !after.contains(key))
            .map(|(_, record)| FileEvent::for_record(FileEventKind::Deleted, record, after))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct WriteProgress {
    size: u64,
    growing: bool,
    observations: u32,
}

/// Reports a file once it has stopped growing.
///
/// A file counts as growing when it first appears or its size changes. After
/// that, the same size seen on `stable_observations` consecutive scans yields a
/// single [`FileEventKind::FinishedWriting`] event.
#[derive(Debug)]
pub struct FinishedWritingRecognizer {
    stable_observations: u32,
    history: Mutex<HashMap<PathBuf, HashMap<FileKey, WriteProgress>>>,
}

impl Default for FinishedWritingRecognizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STABLE_OBSERVATIONS)
    }
}

impl FinishedWritingRecognizer {
    pub const DEFAULT_STABLE_OBSERVATIONS: u32 = 2;

    pub fn new(stable_observations: u32) -> Self {
        Self {
            stable_observations: stable_observations.max(2),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn stable_observations(&self) -> u32 {
        self.stable_observations
    }

    /// Number of files currently tracked for `directory`.
    pub fn tracked(&self, directory: &Path) -> usize {
        let history = self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        history.get(directory).map_or(0, HashMap::len)
    }
}

impl Recognizer for FinishedWritingRecognizer {
    fn name(&self) -> &str {
        "finished-writing"
    }

    fn recognize(&self, before: &Snapshot, after: &Snapshot) -> Vec<FileEvent> {
        let mut history = self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let progress = history.entry(after.directory().to_path_buf()).or_default();

        progress.retain(|key, _| after.contains(key));

        let mut events = Vec::new();
        for (key, record) in after.iter() {
            let entry = match progress.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(WriteProgress {
                        size: record.size,
                        growing: !before.contains(key),
                        observations: 1,
                    });
                    continue;
                }
                Entry::Occupied(slot) => slot.into_mut(),
            };

            if entry.size != record.size {
                entry.size = record.size;
                entry.growing = true;
                entry.observations = 1;
                continue;
            }

            if !entry.growing {
                continue;
            }

            entry.observations += 1;
            if entry.observations >= self.stable_observations {
                entry.growing = false;
                events.push(FileEvent::for_record(
                    FileEventKind::FinishedWriting,
                    record,
                    after,
                ));
            }
        }

        events
    }

    fn forget(&self, directory: &Path) {
        let mut history = self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        history.remove(directory);
    }
}
