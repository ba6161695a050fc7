//! In-memory state store for tests and single-process runs.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use parking_lot::RwLock;

use dsr_graph::CollectionAddress;
use dsr_types::Row;

use crate::checkpoint::{ExecutionLogEntry, PausedCheckpoint};
use crate::RequestStateStore;

#[derive(Default)]
struct RequestState {
    rows: BTreeMap<String, Vec<Row>>,
    erasure_counts: BTreeMap<String, u64>,
    manual_rows: BTreeMap<String, Vec<Row>>,
    manual_counts: BTreeMap<String, u64>,
    paused: Option<PausedCheckpoint>,
    log: Vec<ExecutionLogEntry>,
}

/// Thread-safe in-memory implementation of [`RequestStateStore`].
#[derive(Default)]
pub struct InMemoryStateStore {
    requests: RwLock<HashMap<String, RequestState>>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_request<T>(&self, request_id: &str, f: impl FnOnce(&mut RequestState) -> T) -> T {
        let mut requests = self.requests.write();
        f(requests.entry(request_id.to_string()).or_default())
    }

    fn read_request<T>(&self, request_id: &str, f: impl FnOnce(&RequestState) -> T) -> Option<T> {
        self.requests.read().get(request_id).map(f)
    }
}

impl RequestStateStore for InMemoryStateStore {
    fn record_rows(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        rows: Vec<Row>,
    ) -> Result<()> {
        self.with_request(request_id, |state| {
            state.rows.insert(address.to_string(), rows);
        });
        Ok(())
    }

    fn get_rows(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<Vec<Row>>> {
        Ok(self
            .read_request(request_id, |state| state.rows.get(&address.to_string()).cloned())
            .flatten())
    }

    fn record_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        count: u64,
    ) -> Result<()> {
        self.with_request(request_id, |state| {
            state.erasure_counts.insert(address.to_string(), count);
        });
        Ok(())
    }

    fn get_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<u64>> {
        Ok(self
            .read_request(request_id, |state| {
                state.erasure_counts.get(&address.to_string()).copied()
            })
            .flatten())
    }

    fn set_paused(&self, request_id: &str, checkpoint: PausedCheckpoint) -> Result<()> {
        self.with_request(request_id, |state| {
            state.paused = Some(checkpoint);
        });
        Ok(())
    }

    fn clear_paused(&self, request_id: &str) -> Result<()> {
        self.with_request(request_id, |state| {
            state.paused = None;
        });
        Ok(())
    }

    fn get_paused(&self, request_id: &str) -> Result<Option<PausedCheckpoint>> {
        Ok(self
            .read_request(request_id, |state| state.paused.clone())
            .flatten())
    }

    fn cache_manual_input(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        rows: Vec<Row>,
    ) -> Result<()> {
        self.with_request(request_id, |state| {
            state.manual_rows.insert(address.to_string(), rows);
        });
        Ok(())
    }

    fn get_manual_input(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<Vec<Row>>> {
        Ok(self
            .read_request(request_id, |state| {
                state.manual_rows.get(&address.to_string()).cloned()
            })
            .flatten())
    }

    fn cache_manual_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
        count: u64,
    ) -> Result<()> {
        self.with_request(request_id, |state| {
            state.manual_counts.insert(address.to_string(), count);
        });
        Ok(())
    }

    fn get_manual_erasure_count(
        &self,
        request_id: &str,
        address: &CollectionAddress,
    ) -> Result<Option<u64>> {
        Ok(self
            .read_request(request_id, |state| {
                state.manual_counts.get(&address.to_string()).copied()
            })
            .flatten())
    }

    fn append_log(&self, request_id: &str, entry: ExecutionLogEntry) -> Result<()> {
        self.with_request(request_id, |state| {
            state.log.push(entry);
        });
        Ok(())
    }

    fn get_log(&self, request_id: &str) -> Result<Vec<ExecutionLogEntry>> {
        Ok(self
            .read_request(request_id, |state| state.log.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsr_types::{ActionType, ExecutionLogStatus};
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_rows_round_trip() {
        let store = InMemoryStateStore::new();
        let address = CollectionAddress::new("db", "customer");
        assert!(store.get_rows("req-1", &address).unwrap().is_none());

        let rows = vec![row(&[("id", json!(1)), ("email", json!("x@example.com"))])];
        store.record_rows("req-1", &address, rows.clone()).unwrap();
        assert_eq!(store.get_rows("req-1", &address).unwrap(), Some(rows));

        // Scoped per request
        assert!(store.get_rows("req-2", &address).unwrap().is_none());
    }

    #[test]
    fn test_empty_manual_input_distinct_from_absent() {
        let store = InMemoryStateStore::new();
        let address = CollectionAddress::new("manual", "storage_unit");
        assert!(store.get_manual_input("req-1", &address).unwrap().is_none());

        store.cache_manual_input("req-1", &address, vec![]).unwrap();
        assert_eq!(
            store.get_manual_input("req-1", &address).unwrap(),
            Some(vec![])
        );
    }

    #[test]
    fn test_paused_overwrite_and_clear() {
        let store = InMemoryStateStore::new();
        let first = PausedCheckpoint {
            collection: CollectionAddress::new("manual", "storage_unit"),
            step: ActionType::Access,
            action_needed: vec![],
        };
        let second = PausedCheckpoint {
            collection: CollectionAddress::new("manual", "filing_cabinet"),
            step: ActionType::Access,
            action_needed: vec![],
        };

        store.set_paused("req-1", first).unwrap();
        store.set_paused("req-1", second.clone()).unwrap();
        assert_eq!(store.get_paused("req-1").unwrap(), Some(second));

        store.clear_paused("req-1").unwrap();
        assert!(store.get_paused("req-1").unwrap().is_none());
    }

    #[test]
    fn test_erasure_count_zero_is_present() {
        let store = InMemoryStateStore::new();
        let address = CollectionAddress::new("db", "orders");
        assert!(store.get_erasure_count("req-1", &address).unwrap().is_none());
        store.record_erasure_count("req-1", &address, 0).unwrap();
        assert_eq!(store.get_erasure_count("req-1", &address).unwrap(), Some(0));
    }

    #[test]
    fn test_next_attempt_counts_in_processing() {
        let store = InMemoryStateStore::new();
        assert_eq!(
            store
                .next_attempt("req-1", "storage_unit", ActionType::Access)
                .unwrap(),
            1
        );

        for status in [
            ExecutionLogStatus::InProcessing,
            ExecutionLogStatus::Paused,
            ExecutionLogStatus::InProcessing,
            ExecutionLogStatus::Complete,
        ] {
            store
                .append_log(
                    "req-1",
                    ExecutionLogEntry::now("storage_unit", ActionType::Access, status, 1),
                )
                .unwrap();
        }

        assert_eq!(
            store
                .next_attempt("req-1", "storage_unit", ActionType::Access)
                .unwrap(),
            3
        );
        // Erasure attempts are counted independently of access attempts.
        assert_eq!(
            store
                .next_attempt("req-1", "storage_unit", ActionType::Erasure)
                .unwrap(),
            1
        );
    }
}
