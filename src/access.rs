//! Access pass: walk the traversal, retrieve rows per collection, and record
//! them in the request state.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use dsr_connectors::NodeInputs;
use dsr_graph::{CollectionAddress, DatasetGraph, Traversal, TraversalNode};
use dsr_state::{ActionNeeded, ExecutionLogEntry, PausedCheckpoint, RequestStateStore};
use dsr_types::{ActionType, ExecutionLogStatus, IdentityMap, Row};

use crate::errors::EngineError;
use crate::inputs::gather_node_inputs;
use crate::retry::retry_connector_call;
use crate::{clear_matching_pause, connector_for, log_skipped, AccessResults, ConnectorMap, EngineConfig, RunOutcome};

/// Executes one access pass over the traversal.
///
/// The pass runs in dependency waves: every node whose predecessors have all
/// completed runs concurrently under the worker-pool bound, then the next
/// wave is computed. Completed nodes are recorded as they finish, so a pause
/// or failure never discards sibling work; a later resume re-plans the
/// traversal and skips anything already recorded.
pub struct AccessExecutor {
    request_id: String,
    graph: Arc<DatasetGraph>,
    connectors: Arc<ConnectorMap>,
    seeds: IdentityMap,
    store: Arc<dyn RequestStateStore>,
    config: EngineConfig,
}

impl AccessExecutor {
    pub fn new(
        request_id: impl Into<String>,
        graph: Arc<DatasetGraph>,
        connectors: Arc<ConnectorMap>,
        seeds: IdentityMap,
        store: Arc<dyn RequestStateStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            graph,
            connectors,
            seeds,
            store,
            config,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome<AccessResults>, EngineError> {
        let traversal = Traversal::new(&self.graph, &self.seeds)?;
        info!(
            request = %self.request_id,
            nodes = traversal.nodes().len(),
            skipped = traversal.skipped.len(),
            dropped_edges = traversal.dropped_edges.len(),
            "planned access pass"
        );
        log_skipped(
            self.store.as_ref(),
            &self.request_id,
            ActionType::Access,
            &traversal.skipped,
        )?;

        let mut results = AccessResults::new();
        let mut completed: BTreeSet<CollectionAddress> = BTreeSet::new();
        let mut remaining: Vec<(usize, TraversalNode)> =
            traversal.nodes().iter().cloned().enumerate().collect();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        while !remaining.is_empty() {
            let (ready, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|(_, n)| n.predecessors().iter().all(|p| completed.contains(p)));
            remaining = rest;
            if ready.is_empty() {
                // The planner guarantees progress; reaching this means the
                // traversal and the dependency check disagree.
                return Err(EngineError::State(anyhow!(
                    "access pass stalled with {} nodes unresolved",
                    remaining.len()
                )));
            }

            let mut join_set: JoinSet<Result<(usize, TraversalNode, NodeOutcome), EngineError>> =
                JoinSet::new();
            for (position, node) in ready {
                let inputs = gather_node_inputs(&node, &self.seeds, &results);
                let request_id = self.request_id.clone();
                let graph = Arc::clone(&self.graph);
                let connectors = Arc::clone(&self.connectors);
                let store = Arc::clone(&self.store);
                let config = self.config;
                let semaphore = Arc::clone(&semaphore);
                join_set.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| EngineError::State(anyhow!("worker pool closed: {e}")))?;
                    let outcome = run_access_node(
                        &request_id,
                        &graph,
                        &connectors,
                        store.as_ref(),
                        config,
                        &node,
                        &inputs,
                    )
                    .await?;
                    Ok((position, node, outcome))
                });
            }

            let mut wave = Vec::new();
            let mut failure: Option<EngineError> = None;
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(Ok(item)) => wave.push(item),
                    Ok(Err(e)) => failure = Some(failure.take().unwrap_or(e)),
                    Err(e) => {
                        failure = Some(
                            failure
                                .take()
                                .unwrap_or_else(|| EngineError::State(anyhow!("access task failed: {e}"))),
                        )
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e);
            }

            wave.sort_by_key(|(position, _, _)| *position);
            let mut pause: Option<(CollectionAddress, ActionNeeded)> = None;
            for (_, node, outcome) in wave {
                match outcome {
                    NodeOutcome::Complete(rows) => {
                        completed.insert(node.address.clone());
                        results.insert(node.address, rows);
                    }
                    NodeOutcome::Paused(action) => {
                        // Earliest node in traversal order wins the checkpoint.
                        if pause.is_none() {
                            pause = Some((node.address, action));
                        }
                    }
                }
            }
            if let Some((collection, action)) = pause {
                let checkpoint = PausedCheckpoint {
                    collection,
                    step: ActionType::Access,
                    action_needed: vec![action],
                };
                self.store.set_paused(&self.request_id, checkpoint.clone())?;
                info!(
                    request = %self.request_id,
                    collection = %checkpoint.collection,
                    "access pass paused for manual input"
                );
                return Ok(RunOutcome::Paused(checkpoint));
            }
        }

        self.store.clear_paused(&self.request_id)?;
        info!(request = %self.request_id, collections = results.len(), "access pass complete");
        Ok(RunOutcome::Completed(results))
    }
}

enum NodeOutcome {
    Complete(Vec<Row>),
    Paused(ActionNeeded),
}

async fn run_access_node(
    request_id: &str,
    graph: &DatasetGraph,
    connectors: &ConnectorMap,
    store: &dyn RequestStateStore,
    config: EngineConfig,
    node: &TraversalNode,
    inputs: &NodeInputs,
) -> Result<NodeOutcome, EngineError> {
    // Resume path: a node whose rows are already recorded is reused without
    // touching the connector or the log.
    if let Some(rows) = store.get_rows(request_id, &node.address)? {
        debug!(collection = %node.address, rows = rows.len(), "reusing recorded rows");
        return Ok(NodeOutcome::Complete(rows));
    }

    let name = node.address.collection.as_str();
    let attempt = store.next_attempt(request_id, name, ActionType::Access)?;
    store.append_log(
        request_id,
        ExecutionLogEntry::now(name, ActionType::Access, ExecutionLogStatus::InProcessing, attempt),
    )?;

    let connector = connector_for(graph, connectors, &node.address)?;
    if connector.requires_manual_input() {
        return match store.get_manual_input(request_id, &node.address)? {
            // An empty list is a valid answer: the operator found nothing.
            Some(rows) => {
                store.record_rows(request_id, &node.address, rows.clone())?;
                clear_matching_pause(store, request_id, &node.address, ActionType::Access)?;
                store.append_log(
                    request_id,
                    ExecutionLogEntry::now(
                        name,
                        ActionType::Access,
                        ExecutionLogStatus::Complete,
                        attempt,
                    ),
                )?;
                Ok(NodeOutcome::Complete(rows))
            }
            None => {
                let get = graph
                    .collection(&node.address)
                    .map(|c| c.field_names())
                    .unwrap_or_default();
                store.append_log(
                    request_id,
                    ExecutionLogEntry::now(
                        name,
                        ActionType::Access,
                        ExecutionLogStatus::Paused,
                        attempt,
                    ),
                )?;
                Ok(NodeOutcome::Paused(ActionNeeded {
                    locators: inputs.clone(),
                    get: Some(get),
                    update: None,
                }))
            }
        };
    }

    let retrieved = retry_connector_call(
        config.retry,
        store,
        request_id,
        name,
        ActionType::Access,
        attempt,
        || connector.retrieve(node, inputs),
    )
    .await?;
    match retrieved {
        Ok(rows) => {
            store.record_rows(request_id, &node.address, rows.clone())?;
            store.append_log(
                request_id,
                ExecutionLogEntry::now(name, ActionType::Access, ExecutionLogStatus::Complete, attempt),
            )?;
            debug!(collection = %node.address, rows = rows.len(), "access node complete");
            Ok(NodeOutcome::Complete(rows))
        }
        Err(source) => {
            store.append_log(
                request_id,
                ExecutionLogEntry::now(name, ActionType::Access, ExecutionLogStatus::Error, attempt),
            )?;
            Err(EngineError::Connector {
                collection: node.address.clone(),
                source,
            })
        }
    }
}
