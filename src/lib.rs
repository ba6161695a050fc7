//! Graph-driven execution engine for data-subject requests.
//!
//! A privacy request names a data subject by seed identities (email, phone
//! number). The engine plans a traversal over the dataset reference graph,
//! retrieves the subject's rows collection by collection (access pass), and
//! optionally rewrites matched fields per a masking policy (erasure pass).
//! Collections backed by humans pause the run with a checkpoint describing
//! what an operator must supply; resuming re-plans the traversal and skips
//! everything already recorded, so a request survives process restarts.
//!
//! Crate layout:
//!
//! - [`dsr_graph`]: datasets, reference edges, traversal planning
//! - [`dsr_state`]: request state stores, checkpoints, execution log
//! - [`dsr_connectors`]: the [`Connector`](dsr_connectors::Connector) seam,
//!   mask payloads, connector registry
//! - this crate: the access and erasure executors and retry handling

pub mod access;
pub mod erasure;
pub mod errors;
pub mod inputs;
mod retry;

pub use access::AccessExecutor;
pub use erasure::ErasureExecutor;
pub use errors::EngineError;

use std::collections::BTreeMap;
use std::sync::Arc;

use dsr_connectors::Connector;
use dsr_graph::{CollectionAddress, DatasetGraph};
use dsr_state::{ExecutionLogEntry, PausedCheckpoint, RequestStateStore};
use dsr_types::{ActionType, ExecutionLogStatus, IdentityMap, Policy, RetryConfig, Row};

/// Connectors keyed by the connection key their datasets declare.
pub type ConnectorMap = BTreeMap<String, Arc<dyn Connector>>;

/// Rows retrieved per collection by a completed access pass.
pub type AccessResults = BTreeMap<CollectionAddress, Vec<Row>>;

/// Affected-record counts per collection from a completed erasure pass.
pub type ErasureResults = BTreeMap<CollectionAddress, u64>;

/// Engine-wide execution knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Backoff budget for transient connector failures.
    pub retry: RetryConfig,
    /// Force every mask replacement to null, regardless of rule strategy.
    pub masking_strict: bool,
    /// Worker-pool bound on concurrently executing nodes.
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            masking_strict: true,
            concurrency: 4,
        }
    }
}

/// How a pass ended: ran to completion, or suspended at a manual node.
///
/// A pause is an ordinary outcome, not an error. The checkpoint says which
/// collection is waiting and what an operator must supply before calling the
/// run function again.
#[derive(Debug)]
pub enum RunOutcome<T> {
    Completed(T),
    Paused(PausedCheckpoint),
}

impl<T> RunOutcome<T> {
    pub fn is_paused(&self) -> bool {
        matches!(self, RunOutcome::Paused(_))
    }

    /// The completed value, if the pass finished.
    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::Paused(_) => None,
        }
    }

    /// The checkpoint, if the pass suspended.
    pub fn paused(&self) -> Option<&PausedCheckpoint> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Paused(checkpoint) => Some(checkpoint),
        }
    }
}

/// Run (or resume) the access pass for a request.
pub async fn run_access_request(
    request_id: &str,
    graph: Arc<DatasetGraph>,
    connectors: Arc<ConnectorMap>,
    seeds: IdentityMap,
    store: Arc<dyn RequestStateStore>,
    config: EngineConfig,
) -> Result<RunOutcome<AccessResults>, EngineError> {
    AccessExecutor::new(request_id, graph, connectors, seeds, store, config)
        .run()
        .await
}

/// Run (or resume) the erasure pass for a request, using the rows the access
/// pass retrieved as locators.
#[allow(clippy::too_many_arguments)]
pub async fn run_erasure(
    request_id: &str,
    graph: Arc<DatasetGraph>,
    connectors: Arc<ConnectorMap>,
    policy: Policy,
    seeds: IdentityMap,
    access_results: AccessResults,
    store: Arc<dyn RequestStateStore>,
    config: EngineConfig,
) -> Result<RunOutcome<ErasureResults>, EngineError> {
    ErasureExecutor::new(
        request_id,
        graph,
        connectors,
        policy,
        seeds,
        access_results,
        store,
        config,
    )
    .run()
    .await
}

/// Resolve the connector a collection executes against.
pub(crate) fn connector_for<'a>(
    graph: &DatasetGraph,
    connectors: &'a ConnectorMap,
    address: &CollectionAddress,
) -> Result<&'a Arc<dyn Connector>, EngineError> {
    let key = graph
        .connection_key(address)
        .ok_or_else(|| EngineError::MissingConnection {
            collection: address.clone(),
            connection_key: String::new(),
        })?;
    connectors
        .get(key)
        .ok_or_else(|| EngineError::MissingConnection {
            collection: address.clone(),
            connection_key: key.to_string(),
        })
}

/// Clear the paused checkpoint if it points at the node that just completed.
/// A checkpoint belonging to a different node or pass is left alone.
pub(crate) fn clear_matching_pause(
    store: &dyn RequestStateStore,
    request_id: &str,
    address: &CollectionAddress,
    step: ActionType,
) -> Result<(), EngineError> {
    if let Some(checkpoint) = store.get_paused(request_id)? {
        if checkpoint.collection == *address && checkpoint.step == step {
            store.clear_paused(request_id)?;
        }
    }
    Ok(())
}

/// Log unreachable collections as skipped, once per collection per pass.
/// Resumes re-derive the same skip set and must not duplicate the entries.
pub(crate) fn log_skipped(
    store: &dyn RequestStateStore,
    request_id: &str,
    step: ActionType,
    skipped: &[CollectionAddress],
) -> Result<(), EngineError> {
    if skipped.is_empty() {
        return Ok(());
    }
    let log = store.get_log(request_id)?;
    for address in skipped {
        let already = log.iter().any(|e| {
            e.step == step
                && e.status == ExecutionLogStatus::Skipped
                && e.collection_name == address.collection
        });
        if !already {
            store.append_log(
                request_id,
                ExecutionLogEntry::now(
                    address.collection.as_str(),
                    step,
                    ExecutionLogStatus::Skipped,
                    1,
                ),
            )?;
        }
    }
    Ok(())
}
