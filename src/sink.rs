//! Append-only JSON array store for extracted records.
//!
//! Every append is a full read-append-rewrite of the backing file. The cycle
//! runs under an in-process mutex and an exclusive lock file next to the
//! output, so overlapping runs (in this process or another) serialize instead
//! of overwriting each other. The new array is written to a temporary file and
//! renamed over the target, so a crash mid-write leaves the previous version.
//!
//! A backing file that exists but is not a JSON array is never discarded: it is
//! moved aside to `<file>.corrupt-<timestamp>` and a fresh collection is
//! started.

use crate::error::SinkError;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

const LOCK_POLL: Duration = Duration::from_millis(25);

/// A lock file untouched for this long is assumed to belong to a crashed writer
const STALE_LOCK: Duration = Duration::from_secs(120);

/// What an append did to the backing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Number of records in the collection after the append
    pub len: usize,
    /// The file did not exist before this append
    pub created: bool,
    /// Where an unreadable previous file was moved
    pub recovered_from: Option<PathBuf>,
}

#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    lock_path: PathBuf,
    tmp_path: PathBuf,
    lock_wait: Duration,
    guard: Mutex<()>,
}

impl OutputSink {
    pub fn new(path: impl Into<PathBuf>, lock_wait: Duration) -> Self {
        let path = path.into();
        let lock_path = sibling(&path, "lock");
        let tmp_path = sibling(&path, "tmp");
        Self {
            path,
            lock_path,
            tmp_path,
            lock_wait,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record to the collection
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<AppendOutcome, SinkError> {
        let value = serde_json::to_value(record)?;

        let _guard = self.guard.lock().await;
        ensure_parent(&self.path).await?;
        let _lock = LockFile::acquire(&self.lock_path, self.lock_wait).await?;

        let mut outcome = AppendOutcome {
            len: 0,
            created: false,
            recovered_from: None,
        };

        let mut collection = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => match serde_json::from_str::<Vec<Value>>(&text) {
                Ok(items) => items,
                Err(e) => {
                    let backup = self.preserve_corrupt().await?;
                    ::log::warn!(
                        "Output store {} is not a JSON array ({}); moved it to {} and started a new collection",
                        self.path.display(),
                        e,
                        backup.display()
                    );
                    outcome.recovered_from = Some(backup);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ::log::info!("Creating output store {}", self.path.display());
                outcome.created = true;
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        collection.push(value);
        self.rewrite(&collection).await?;

        outcome.len = collection.len();
        ::log::trace!(
            "Appended record #{} to {}",
            outcome.len,
            self.path.display()
        );
        Ok(outcome)
    }

    /// Number of records stored, or `None` when nothing has been written yet
    pub async fn len(&self) -> Result<Option<usize>, SinkError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(Some(0)),
            Ok(text) => Ok(Some(serde_json::from_str::<Vec<Value>>(&text)?.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn rewrite(&self, collection: &[Value]) -> Result<(), SinkError> {
        let bytes = serde_json::to_vec_pretty(collection)?;

        let mut file = tokio::fs::File::create(&self.tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&self.tmp_path, &self.path).await?;
        Ok(())
    }

    async fn preserve_corrupt(&self) -> Result<PathBuf, SinkError> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let backup = sibling(&self.path, &format!("corrupt-{}", stamp));
        tokio::fs::rename(&self.path, &backup).await?;
        Ok(backup)
    }
}

/// `data/out.json` + `lock` -> `data/out.json.lock`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Exclusive lock held by existence of a file carrying the holder's token.
/// Released on drop, but only while the file still carries that token.
struct LockFile {
    path: PathBuf,
    token: String,
}

impl LockFile {
    async fn acquire(path: &Path, wait: Duration) -> Result<Self, SinkError> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now().checked_add(wait);
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(mut file) => {
                    let written: std::io::Result<()> = async {
                        file.write_all(token.as_bytes()).await?;
                        file.sync_all().await
                    }
                    .await;
                    if let Err(e) = written {
                        let _ = tokio::fs::remove_file(path).await;
                        return Err(e.into());
                    }
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(observed) = stale_token(path).await {
                        break_stale(path, &observed).await?;
                        continue;
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(SinkError::LockTimeout(path.to_path_buf()));
                    }
                    sleep(LOCK_POLL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(held) if held == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    ::log::warn!("Failed to release lock {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => ::log::warn!(
                "Lock {} is held by another writer, leaving it in place",
                self.path.display()
            ),
            Err(e) => ::log::warn!("Lock {} vanished before release: {}", self.path.display(), e),
        }
    }
}

/// Token of the lock at `path` if it has not been touched for [`STALE_LOCK`]
async fn stale_token(path: &Path) -> Option<String> {
    if !is_stale(path).await {
        return None;
    }
    tokio::fs::read_to_string(path).await.ok()
}

/// Moves a stale lock aside under a unique name. Rename is atomic, so of
/// several writers breaking the same lock only one takes it. When the file
/// taken turns out to be a fresh lock that replaced the stale one, it is put
/// back.
async fn break_stale(path: &Path, observed: &str) -> Result<(), SinkError> {
    let aside = sibling(path, &format!("stale-{}", Uuid::new_v4()));
    match tokio::fs::rename(path, &aside).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    let taken = tokio::fs::read_to_string(&aside).await.unwrap_or_default();
    if taken == observed && is_stale(&aside).await {
        ::log::warn!("Broke stale lock {}", path.display());
    } else if let Err(e) = tokio::fs::hard_link(&aside, path).await {
        ::log::warn!(
            "Could not restore live lock {} after breaking: {}",
            path.display(),
            e
        );
    }

    let _ = tokio::fs::remove_file(&aside).await;
    Ok(())
}

async fn is_stale(path: &Path) -> bool {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().map(|age| age > STALE_LOCK).unwrap_or(false),
        Err(_) => false,
    }
}
