//! Point-in-time records of a directory's file population.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Identity of a file within its directory.
pub type FileKey = OsString;

/// What a scan observed about one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Immediate regular files of one directory at one instant. Never mutated
/// after construction; each scan builds a fresh one.
#[derive(Debug, Clone)]
pub struct Snapshot {
    directory: PathBuf,
    taken_at: SystemTime,
    files: BTreeMap<FileKey, FileRecord>,
}

impl Snapshot {
    /// List `directory` (non-recursively) and record every regular file.
    ///
    /// Entries that disappear between listing and stat are skipped; only a
    /// failure to read the directory itself is an error.
    pub fn capture<P: AsRef<Path>>(directory: P) -> io::Result<Self> {
        let directory = directory.as_ref();
        let mut files = BTreeMap::new();

        for entry in fs::read_dir(directory)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!("Skipping unreadable entry in {}: {}", directory.display(), err);
                    continue;
                }
            };

            let metadata = match fs::metadata(entry.path()) {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    tracing::debug!("Cannot stat {}: {}", entry.path().display(), err);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let record = FileRecord {
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            };
            files.insert(entry.file_name(), record);
        }

        Ok(Self {
            directory: directory.to_path_buf(),
            taken_at: SystemTime::now(),
            files,
        })
    }

    /// Snapshot standing in for a directory that could not be read.
    pub fn empty<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            taken_at: SystemTime::now(),
            files: BTreeMap::new(),
        }
    }

    /// Build a snapshot from already known records, keyed by file name.
    pub fn from_records<P, I>(directory: P, records: I) -> Self
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = FileRecord>,
    {
        let files = records
            .into_iter()
            .filter_map(|record| {
                let key = record.path.file_name()?.to_os_string();
                Some((key, record))
            })
            .collect();

        Self {
            directory: directory.as_ref().to_path_buf(),
            taken_at: SystemTime::now(),
            files,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    pub fn get(&self, key: &FileKey) -> Option<&FileRecord> {
        self.files.get(key)
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.files.contains_key(key)
    }

    /// Files in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&FileKey, &FileRecord)> {
        self.files.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FileKey> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
