use std::path::PathBuf;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};

use super::snapshot::{FileRecord, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    FinishedWriting,
}

/// A single file-level change found by a recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub directory: PathBuf,
    pub size: Option<u64>,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    DiscoveryStarted,
    DiscoveryEnded,
    ScanStarted,
    ScanEnded,
    Throttled,
}

/// A scan-lifecycle milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub message: String,
    pub timestamp: SystemTime,
}

/// Everything a monitor can deliver, as carried by [`ChannelListener`](super::ChannelListener).
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Activity(FileEvent),
    Status(StatusEvent),
}

impl FileEvent {
    pub fn new<P: Into<PathBuf>, D: Into<PathBuf>>(kind: FileEventKind, path: P, directory: D) -> Self {
        Self {
            kind,
            path: path.into(),
            directory: directory.into(),
            size: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Event describing `record` as seen in `snapshot`, stamped with the
    /// time the snapshot was taken.
    pub fn for_record(kind: FileEventKind, record: &FileRecord, snapshot: &Snapshot) -> Self {
        Self::new(kind, record.path.clone(), snapshot.directory())
            .with_size(record.size)
            .with_timestamp(snapshot.taken_at())
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl StatusEvent {
    pub fn new<S: Into<String>>(kind: StatusKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }
}

impl FileEventKind {
    pub fn label(&self) -> &'static str {
        match self {
            FileEventKind::Created => "CREATED",
            FileEventKind::Modified => "MODIFIED",
            FileEventKind::Deleted => "DELETED",
            FileEventKind::FinishedWriting => "FINISHED",
        }
    }
}
