//! Filesystem-backed state store.
//!
//! Survives process restarts within a request's lifetime: rows, counts, the
//! checkpoint slot, and the execution log all live under one directory per
//! request. Row and checkpoint files are written atomically (temp file +
//! rename); the log is an append-only jsonl file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use dsr_graph::CollectionAddress;
use dsr_types::Row;

use crate::checkpoint::{ExecutionLogEntry, PausedCheckpoint};
use crate::paths::{
    atomic_write_json, checkpoint_path, ensure_parent_dirs, erasure_counts_path, log_path,
    manual_counts_path, manual_rows_path, rows_path,
};
use crate::RequestStateStore;

/// Filesystem implementation of [`RequestStateStore`].
pub struct FsStateStore {
    root: PathBuf,
    // Guards read-modify-write of the count map files; row and checkpoint
    // writes are already atomic per file.
    counts_lock: Mutex<()>,
    log_lock: Mutex<()>,
}

impl FsStateStore {
    /// Open (or create) a store rooted at the given directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|e| anyhow!("Failed to create state root {}: {}", root.display(), e))?;
        Ok(Self {
            root,
            counts_lock: Mutex::new(()),
            log_lock: Mutex::new(()),
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        let value = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(Some(value))
    }

    fn update_count_map(&self, path: &Path, key: String, count: u64) -> Result<()> {
        let _guard = self.counts_lock.lock();
        let mut counts: BTreeMap<String, u64> = Self::read_json(path)?.unwrap_or_default();
        counts.insert(key, count);
        atomic_write_json(path, &counts)
    }

    fn read_count_map(&self, path: &Path, key: &str) -> Result<Option<u64>> {
        let counts: Option<BTreeMap<String, u64>> = Self::read_json(path)?;
        Ok(counts.and_then(|c| c.get(key).copied()))
    }
}

impl RequestStateStore for FsStateStore {
    fn record_rows(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        rows: Vec<Row>,
    ) -> Result<()> {
        atomic_write_json(&rows_path(&self.root, request_id, address), &rows)
    }

    fn get_rows(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<Vec<Row>>> {
        Self::read_json(&rows_path(&self.root, request_id, address))
    }

    fn record_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        count: u64,
    ) -> Result<()> {
        self.update_count_map(
            &erasure_counts_path(&self.root, request_id),
            address.to_string(),
            count,
        )
    }

    fn get_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<u64>> {
        self.read_count_map(
            &erasure_counts_path(&self.root, request_id),
            &address.to_string(),
        )
    }

    fn set_paused(&self, request_id: &str, checkpoint: PausedCheckpoint) -> Result<()> {
        atomic_write_json(&checkpoint_path(&self.root, request_id), &checkpoint)
    }

    fn clear_paused(&self, request_id: &str) -> Result<()> {
        let path = checkpoint_path(&self.root, request_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| anyhow!("Failed to remove {}: {}", path.display(), e))?;
        }
        Ok(())
    }

    fn get_paused(&self, request_id: &str) -> Result<Option<PausedCheckpoint>> {
        Self::read_json(&checkpoint_path(&self.root, request_id))
    }

    fn cache_manual_input(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        rows: Vec<Row>,
    ) -> Result<()> {
        atomic_write_json(&manual_rows_path(&self.root, request_id, address), &rows)
    }

    fn get_manual_input(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<Vec<Row>>> {
        Self::read_json(&manual_rows_path(&self.root, request_id, address))
    }

    fn cache_manual_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        count: u64,
    ) -> Result<()> {
        self.update_count_map(
            &manual_counts_path(&self.root, request_id),
            address.to_string(),
            count,
        )
    }

    fn get_manual_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<u64>> {
        self.read_count_map(
            &manual_counts_path(&self.root, request_id),
            &address.to_string(),
        )
    }

    fn append_log(&self, request_id: &str, entry: ExecutionLogEntry) -> Result<()> {
        let _guard = self.log_lock.lock();
        let path = log_path(&self.root, request_id);
        ensure_parent_dirs(&path)?;
        let line = serde_json::to_string(&entry)
            .map_err(|e| anyhow!("Failed to serialize log entry: {}", e))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| anyhow!("Failed to open {}: {}", path.display(), e))?;
        writeln!(file, "{}", line)
            .map_err(|e| anyhow!("Failed to append to {}: {}", path.display(), e))?;
        Ok(())
    }

    fn get_log(&self, request_id: &str) -> Result<Vec<ExecutionLogEntry>> {
        let path = log_path(&self.root, request_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l)
                    .map_err(|e| anyhow!("Failed to parse log line in {}: {}", path.display(), e))
            })
            .collect()
    }
}
