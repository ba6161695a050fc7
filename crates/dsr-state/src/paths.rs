//! Path utilities for the per-request filesystem layout.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<request_id>/rows/<dataset>__<collection>.json
//! <root>/<request_id>/manual_rows/<dataset>__<collection>.json
//! <root>/<request_id>/erasure_counts.json
//! <root>/<request_id>/manual_counts.json
//! <root>/<request_id>/checkpoint.json
//! <root>/<request_id>/log.jsonl
//! ```

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use dsr_graph::CollectionAddress;

/// Filesystem-safe form of a request id or name component.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Filesystem-safe file stem for a collection address.
pub fn address_file_stem(address: &CollectionAddress) -> String {
    format!(
        "{}__{}",
        sanitize_component(&address.dataset),
        sanitize_component(&address.collection)
    )
}

/// Directory holding one request's state.
pub fn request_dir(root: &Path, request_id: &str) -> PathBuf {
    root.join(sanitize_component(request_id))
}

/// Path of a collection's recorded access rows.
pub fn rows_path(root: &Path, request_id: &str, address: &CollectionAddress) -> PathBuf {
    request_dir(root, request_id)
        .join("rows")
        .join(format!("{}.json", address_file_stem(address)))
}

/// Path of a collection's manually supplied rows.
pub fn manual_rows_path(root: &Path, request_id: &str, address: &CollectionAddress) -> PathBuf {
    request_dir(root, request_id)
        .join("manual_rows")
        .join(format!("{}.json", address_file_stem(address)))
}

/// Path of the per-request erasure count map.
pub fn erasure_counts_path(root: &Path, request_id: &str) -> PathBuf {
    request_dir(root, request_id).join("erasure_counts.json")
}

/// Path of the per-request manual erasure confirmation map.
pub fn manual_counts_path(root: &Path, request_id: &str) -> PathBuf {
    request_dir(root, request_id).join("manual_counts.json")
}

/// Path of the paused checkpoint slot.
pub fn checkpoint_path(root: &Path, request_id: &str) -> PathBuf {
    request_dir(root, request_id).join("checkpoint.json")
}

/// Path of the append-only execution log.
pub fn log_path(root: &Path, request_id: &str) -> PathBuf {
    request_dir(root, request_id).join("log.jsonl")
}

/// Ensure all parent directories exist for a path.
pub fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
    }
    Ok(())
}

/// Write a file atomically (write to .tmp, then rename).
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|s| s.to_str()).unwrap_or("tmp")
    ));
    std::fs::write(&tmp_path, contents)
        .map_err(|e| anyhow!("Failed to write temp file {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        anyhow!(
            "Failed to rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;
    Ok(())
}

/// Write a JSON file atomically (compact format, no pretty printing).
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value).map_err(|e| anyhow!("Failed to serialize JSON: {}", e))?;
    atomic_write(path, &json)
}
