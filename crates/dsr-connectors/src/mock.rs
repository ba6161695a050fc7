//! Scripted connector for tests.
//!
//! Holds an in-memory table of rows per collection address, filters them by
//! locator inputs the way a real connector pushes locators into its query,
//! and records every invocation so tests can assert exactly how many calls a
//! pass made and what payloads it sent.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use dsr_graph::{CollectionAddress, TraversalNode};
use dsr_types::Row;

use crate::{Connector, ConnectorExecutionError, MaskPayload, NodeInputs};

/// In-memory scripted connector.
#[derive(Default)]
pub struct MockConnector {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    retrieve_calls: Mutex<Vec<String>>,
    mask_calls: Mutex<Vec<(String, MaskPayload)>>,
    transient_failures: Mutex<HashMap<String, usize>>,
    permanent_failures: Mutex<Vec<String>>,
}

impl MockConnector {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the full row set for a collection.
    pub fn set_table(&self, address: &CollectionAddress, rows: Vec<Row>) {
        self.tables.write().insert(address.to_string(), rows);
    }

    /// Make the next `times` retrieve/mask calls for a collection fail with a
    /// transient error before succeeding.
    pub fn fail_transiently(&self, address: &CollectionAddress, times: usize) {
        self.transient_failures
            .lock()
            .insert(address.to_string(), times);
    }

    /// Make every call for a collection fail permanently.
    pub fn fail_permanently(&self, address: &CollectionAddress) {
        self.permanent_failures.lock().push(address.to_string());
    }

    /// How many retrieve calls hit a collection.
    pub fn retrieve_call_count(&self, address: &CollectionAddress) -> usize {
        let key = address.to_string();
        self.retrieve_calls
            .lock()
            .iter()
            .filter(|a| **a == key)
            .count()
    }

    /// The payloads sent to mask a collection, in call order.
    pub fn mask_payloads(&self, address: &CollectionAddress) -> Vec<MaskPayload> {
        let key = address.to_string();
        self.mask_calls
            .lock()
            .iter()
            .filter(|(a, _)| *a == key)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn check_failures(&self, key: &str) -> Result<(), ConnectorExecutionError> {
        if self.permanent_failures.lock().iter().any(|a| a == key) {
            return Err(ConnectorExecutionError::permanent(format!(
                "scripted permanent failure for {}",
                key
            )));
        }
        let mut failures = self.transient_failures.lock();
        if let Some(remaining) = failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ConnectorExecutionError::transient(format!(
                    "scripted timeout for {}",
                    key
                )));
            }
        }
        Ok(())
    }

    /// A row matches when any locator field holds one of its candidate values.
    fn row_matches(row: &Row, inputs: &NodeInputs) -> bool {
        inputs.iter().any(|(field, values)| {
            row.get(field)
                .map(|v| values.contains(v))
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn retrieve(
        &self,
        node: &TraversalNode,
        inputs: &NodeInputs,
    ) -> Result<Vec<Row>, ConnectorExecutionError> {
        let key = node.address.to_string();
        self.check_failures(&key)?;
        self.retrieve_calls.lock().push(key.clone());

        let tables = self.tables.read();
        let rows = tables
            .get(&key)
            .map(|all| {
                all.iter()
                    .filter(|row| Self::row_matches(row, inputs))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn mask(
        &self,
        node: &TraversalNode,
        rows: &[Row],
        payload: &MaskPayload,
    ) -> Result<u64, ConnectorExecutionError> {
        let key = node.address.to_string();
        self.check_failures(&key)?;
        self.mask_calls.lock().push((key, payload.clone()));
        Ok(rows.len() as u64)
    }

    async fn test_connection(&self) -> Result<(), ConnectorExecutionError> {
        Ok(())
    }
}

/// Shorthand for building a row literal in tests.
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
