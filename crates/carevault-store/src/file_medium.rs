//! File-backed medium: one file per key under a data directory.
//!
//! Writes go to a temporary sibling file which is then renamed over the
//! target, so a crash mid-write leaves either the old or the new value, never
//! a torn one. File names are the hex encoding of the key bytes, which keeps
//! arbitrary key strings filesystem-safe.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::medium::{Medium, MediumStats};

const ENTRY_EXTENSION: &str = "json";
const TEMP_MARKER: &str = ".tmp-";

/// Medium storing each key as a file under `root`.
pub struct FileMedium {
    root: PathBuf,
    sync_writes: bool,
    temp_seq: AtomicU64,
    stats: Mutex<MediumStats>,
}

impl FileMedium {
    /// Opens (creating if needed) a data directory.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "opened file medium");
        let medium = Self {
            root,
            sync_writes: true,
            temp_seq: AtomicU64::new(0),
            stats: Mutex::new(MediumStats::default()),
        };
        medium.remove_stale_temp_files().await;
        Ok(medium)
    }

    /// Disables fsync after each write. Only suitable for scratch data.
    pub fn without_sync(mut self) -> Self {
        self.sync_writes = false;
        self
    }

    /// The data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", encode_key(key), ENTRY_EXTENSION))
    }

    async fn remove_stale_temp_files(&self) {
        let Ok(mut dir) = tokio::fs::read_dir(&self.root).await else {
            return;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name();
            if name.to_string_lossy().contains(TEMP_MARKER) {
                debug!(file = ?name, "removing leftover temp file");
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    warn!(file = ?name, error = %e, "failed to remove temp file");
                }
            }
        }
    }

    fn update_stats<F>(&self, f: F)
    where
        F: FnOnce(&mut MediumStats),
    {
        f(&mut self.stats.lock());
    }

    fn record_error<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if result.is_err() {
            self.update_stats(|s| s.errors += 1);
        }
        result
    }

    async fn write_atomic(&self, key: &str, value: &str) -> StoreResult<()> {
        let target = self.entry_path(key);
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let temp = self.root.join(format!(
            "{}{}{}-{}",
            encode_key(key),
            TEMP_MARKER,
            std::process::id(),
            seq
        ));

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(value.as_bytes()).await?;
        if self.sync_writes {
            file.sync_all().await?;
        }
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

impl Medium for FileMedium {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.entry_path(key);
        let result = match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Medium {
                    reason: format!("{} is not UTF-8: {}", path.display(), e),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        };
        if result.is_ok() {
            self.update_stats(|s| s.reads += 1);
        }
        self.record_error(result)
    }

    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        debug!(key = %key, size = value.len(), "file medium write");
        let result = self.write_atomic(key, &value).await;
        if result.is_ok() {
            self.update_stats(|s| s.writes += 1);
        }
        self.record_error(result)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let result = match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
        if result.is_ok() {
            self.update_stats(|s| s.deletes += 1);
        }
        self.record_error(result)
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if let Some(key) = entry_key(&entry) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn sizes(&self) -> StoreResult<Vec<(String, u64)>> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut sizes = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let Some(key) = entry_key(&entry) else {
                continue;
            };
            match entry.metadata().await {
                Ok(meta) => {
                    let size = key.len() as u64 + meta.len();
                    sizes.push((key, size));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return self.record_error(Err(e.into())),
            }
        }
        Ok(sizes)
    }

    fn stats(&self) -> MediumStats {
        self.stats.lock().clone()
    }
}

fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{:02x}", b)).collect()
}

fn entry_key(entry: &tokio::fs::DirEntry) -> Option<String> {
    let name = entry.file_name();
    let key = name
        .to_str()
        .and_then(|n| n.strip_suffix(&format!(".{}", ENTRY_EXTENSION)))
        .and_then(decode_key);
    if key.is_none() {
        debug!(file = ?name, "skipping foreign file in data directory");
    }
    key
}

fn decode_key(stem: &str) -> Option<String> {
    if stem.is_empty() || stem.len() % 2 != 0 || !stem.is_ascii() {
        return None;
    }
    let bytes = stem
        .as_bytes()
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
