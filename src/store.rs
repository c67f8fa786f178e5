//! Snapshot store: cleaned datasets held between the first report and a
//! correction submission, keyed by an opaque token.
//!
//! Entries are created after validation, read-then-deleted when a correction
//! batch commits, and evicted by age through [`SnapshotStore::evict_older_than`].

use std::{
    collections::HashMap,
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clean::CleanedSnapshot;

const SNAPSHOT_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotToken(Uuid);

impl SnapshotToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SnapshotToken {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s.trim())
            .with_context(|| format!("Invalid snapshot token '{s}'"))?;
        Ok(Self(uuid))
    }
}

pub trait SnapshotStore {
    fn insert(&mut self, snapshot: &CleanedSnapshot) -> Result<SnapshotToken>;

    /// Returns an owned copy; the stored entry is untouched.
    fn get(&self, token: &SnapshotToken) -> Result<Option<CleanedSnapshot>>;

    /// Returns whether an entry was removed.
    fn remove(&mut self, token: &SnapshotToken) -> Result<bool>;

    /// Drops entries at least `max_age` old and returns how many were dropped.
    fn evict_older_than(&mut self, max_age: Duration) -> Result<usize>;
}

fn is_stale(created: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    // A timestamp ahead of `now` counts as brand new.
    now.duration_since(created).unwrap_or(Duration::ZERO) >= max_age
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    entries: HashMap<SnapshotToken, (SystemTime, CleanedSnapshot)>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn insert(&mut self, snapshot: &CleanedSnapshot) -> Result<SnapshotToken> {
        let token = SnapshotToken::generate();
        self.entries
            .insert(token, (SystemTime::now(), snapshot.clone()));
        Ok(token)
    }

    fn get(&self, token: &SnapshotToken) -> Result<Option<CleanedSnapshot>> {
        Ok(self.entries.get(token).map(|(_, snapshot)| snapshot.clone()))
    }

    fn remove(&mut self, token: &SnapshotToken) -> Result<bool> {
        Ok(self.entries.remove(token).is_some())
    }

    fn evict_older_than(&mut self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, (created, _)| !is_stale(*created, now, max_age));
        Ok(before - self.entries.len())
    }
}

/// One JSON file per snapshot under a directory; age is the file's
/// modification time.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Creating snapshot directory {dir:?}"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, token: &SnapshotToken) -> PathBuf {
        self.dir.join(format!("{token}.{SNAPSHOT_EXTENSION}"))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn insert(&mut self, snapshot: &CleanedSnapshot) -> Result<SnapshotToken> {
        let token = SnapshotToken::generate();
        let path = self.path_for(&token);
        let staging = path.with_extension("tmp");
        {
            let file = File::create(&staging)
                .with_context(|| format!("Creating snapshot file {staging:?}"))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, snapshot).context("Writing snapshot JSON")?;
            writer.flush().context("Flushing snapshot file")?;
        }
        fs::rename(&staging, &path).with_context(|| format!("Publishing snapshot {path:?}"))?;
        debug!("Stored snapshot {token} at {path:?}");
        Ok(token)
    }

    fn get(&self, token: &SnapshotToken) -> Result<Option<CleanedSnapshot>> {
        let path = self.path_for(token);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("Opening snapshot file {path:?}"));
            }
        };
        let snapshot = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing snapshot file {path:?}"))?;
        Ok(Some(snapshot))
    }

    fn remove(&mut self, token: &SnapshotToken) -> Result<bool> {
        let path = self.path_for(token);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("Removing snapshot file {path:?}")),
        }
    }

    fn evict_older_than(&mut self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut evicted = 0usize;
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Listing snapshot directory {:?}", self.dir))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_snapshot = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == SNAPSHOT_EXTENSION || ext == "tmp");
            if !is_snapshot {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .with_context(|| format!("Reading modification time of {path:?}"))?;
            if is_stale(modified, now, max_age) {
                fs::remove_file(&path).with_context(|| format!("Removing stale snapshot {path:?}"))?;
                info!("Deleted stale snapshot {:?}", path.file_name().unwrap_or_default());
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}
