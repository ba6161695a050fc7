//! Request-scoped execution state.
//!
//! The single source of truth for what a privacy request has already
//! retrieved or erased, keyed by `(request_id, collection address)`:
//!
//! - retrieved rows per collection (access pass)
//! - affected-row counts per collection (erasure pass)
//! - the single paused checkpoint slot with its Action-Needed descriptor
//! - manually supplied rows and erasure confirmations
//! - the append-only execution log
//!
//! Two implementations are provided: [`InMemoryStateStore`] for tests and
//! single-process runs, and [`FsStateStore`] which survives process restarts
//! within a request's lifetime via atomic JSON writes.

pub mod checkpoint;
pub mod fs;
pub mod memory;
pub mod paths;

pub use checkpoint::{ActionNeeded, ExecutionLogEntry, PausedCheckpoint};
pub use fs::FsStateStore;
pub use memory::InMemoryStateStore;

use anyhow::Result;

use dsr_graph::CollectionAddress;
use dsr_types::{ActionType, ExecutionLogStatus, Row};

/// Durable-enough storage for one privacy request's execution state.
///
/// Implementations must support concurrent append/read keyed by
/// `(request_id, address)`; concurrent writes to the *same* address never
/// occur because each node owns its address exclusively while executing.
pub trait RequestStateStore: Send + Sync {
    /// Record the retrieved rows for a collection. The last complete write
    /// for a node wins; recording identical content twice is harmless.
    fn record_rows(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        rows: Vec<Row>,
    ) -> Result<()>;

    /// Rows previously recorded for a collection, if the node completed.
    fn get_rows(&self, request_id: &str, address: &CollectionAddress)
        -> Result<Option<Vec<Row>>>;

    /// Record the affected-row count from an erasure of a collection.
    fn record_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        count: u64,
    ) -> Result<()>;

    /// Count previously recorded for a collection's erasure, if any.
    /// `Some(0)` is distinct from `None` ("not attempted").
    fn get_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<u64>>;

    /// Write the paused checkpoint, overwriting any prior one. Only one
    /// checkpoint is outstanding per request at a time.
    fn set_paused(&self, request_id: &str, checkpoint: PausedCheckpoint) -> Result<()>;

    /// Clear the paused checkpoint.
    fn clear_paused(&self, request_id: &str) -> Result<()>;

    /// The outstanding checkpoint, if the request is paused.
    fn get_paused(&self, request_id: &str) -> Result<Option<PausedCheckpoint>>;

    /// Operator boundary: supply rows for a manual collection. An empty list
    /// is a valid answer meaning "no data was found".
    fn cache_manual_input(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        rows: Vec<Row>,
    ) -> Result<()>;

    /// Manually supplied rows for a collection, if any were cached.
    fn get_manual_input(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<Vec<Row>>>;

    /// Operator boundary: confirm a manual erasure with the count of records
    /// the human asserts were erased.
    fn cache_manual_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        count: u64,
    ) -> Result<()>;

    /// Manually confirmed erasure count for a collection, if cached.
    fn get_manual_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<u64>>;

    /// Append one status transition to the execution log. Entries are never
    /// overwritten or deleted.
    fn append_log(&self, request_id: &str, entry: ExecutionLogEntry) -> Result<()>;

    /// The full execution log for a request, in append order.
    fn get_log(&self, request_id: &str) -> Result<Vec<ExecutionLogEntry>>;

    /// The 1-based attempt ordinal for the next visit of a collection within
    /// a pass, derived from prior `in_processing` entries.
    fn next_attempt(
        &self,
        request_id: &str,
        collection_name: &str,
        step: ActionType,
    ) -> Result<u32> {
        let prior = self
            .get_log(request_id)?
            .iter()
            .filter(|e| {
                e.collection_name == collection_name
                    && e.step == step
                    && e.status == ExecutionLogStatus::InProcessing
            })
            .count();
        Ok(prior as u32 + 1)
    }
}
