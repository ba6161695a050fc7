//! Erasure pass: build the mask payload per collection from the policy and
//! apply it through the connectors, using the rows the access pass retrieved.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use dsr_connectors::{MaskInstruction, MaskPayload, NodeInputs, Replacement};
use dsr_graph::{Collection, CollectionAddress, DatasetGraph, Traversal, TraversalNode};
use dsr_state::{ActionNeeded, ExecutionLogEntry, PausedCheckpoint, RequestStateStore};
use dsr_types::{ActionType, ExecutionLogStatus, IdentityMap, MaskingStrategy, Policy, Row};

use crate::errors::EngineError;
use crate::inputs::{erasure_locators, gather_node_inputs};
use crate::retry::retry_connector_call;
use crate::{clear_matching_pause, connector_for, log_skipped, AccessResults, ConnectorMap, EngineConfig, ErasureResults, RunOutcome};

/// Executes one erasure pass.
///
/// Erasure nodes have no data dependencies on each other (locators come from
/// the already-completed access pass), so all nodes run as a single wave
/// bounded by the worker pool. Every traversal node is visited even when
/// nothing matches the policy, so the final count map covers the whole graph.
pub struct ErasureExecutor {
    request_id: String,
    graph: Arc<DatasetGraph>,
    connectors: Arc<ConnectorMap>,
    policy: Policy,
    seeds: IdentityMap,
    access_results: Arc<AccessResults>,
    store: Arc<dyn RequestStateStore>,
    config: EngineConfig,
}

impl ErasureExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: impl Into<String>,
        graph: Arc<DatasetGraph>,
        connectors: Arc<ConnectorMap>,
        policy: Policy,
        seeds: IdentityMap,
        access_results: AccessResults,
        store: Arc<dyn RequestStateStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            graph,
            connectors,
            policy,
            seeds,
            access_results: Arc::new(access_results),
            store,
            config,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome<ErasureResults>, EngineError> {
        let traversal = Traversal::new(&self.graph, &self.seeds)?;
        info!(
            request = %self.request_id,
            nodes = traversal.nodes().len(),
            skipped = traversal.skipped.len(),
            "planned erasure pass"
        );
        log_skipped(
            self.store.as_ref(),
            &self.request_id,
            ActionType::Erasure,
            &traversal.skipped,
        )?;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut join_set: JoinSet<Result<(usize, CollectionAddress, ErasureOutcome), EngineError>> =
            JoinSet::new();
        for (position, node) in traversal.nodes().iter().cloned().enumerate() {
            let inputs = gather_node_inputs(&node, &self.seeds, &self.access_results);
            let request_id = self.request_id.clone();
            let graph = Arc::clone(&self.graph);
            let connectors = Arc::clone(&self.connectors);
            let policy = self.policy.clone();
            let store = Arc::clone(&self.store);
            let config = self.config;
            let access_results = Arc::clone(&self.access_results);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::State(anyhow!("worker pool closed: {e}")))?;
                let rows = access_results
                    .get(&node.address)
                    .cloned()
                    .unwrap_or_default();
                let outcome = run_erasure_node(
                    &request_id,
                    &graph,
                    &connectors,
                    store.as_ref(),
                    config,
                    &policy,
                    &node,
                    &rows,
                    &inputs,
                )
                .await?;
                Ok((position, node.address, outcome))
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
                            .unwrap_or_else(|| EngineError::State(anyhow!("erasure task failed: {e}"))),
                    )
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        wave.sort_by_key(|(position, _, _)| *position);
        let mut counts = ErasureResults::new();
        let mut pause: Option<(CollectionAddress, ActionNeeded)> = None;
        for (_, address, outcome) in wave {
            match outcome {
                ErasureOutcome::Complete(count) => {
                    counts.insert(address, count);
                }
                ErasureOutcome::Paused(action) => {
                    if pause.is_none() {
                        pause = Some((address, action));
                    }
                }
            }
        }
        if let Some((collection, action)) = pause {
            let checkpoint = PausedCheckpoint {
                collection,
                step: ActionType::Erasure,
                action_needed: vec![action],
            };
            self.store.set_paused(&self.request_id, checkpoint.clone())?;
            info!(
                request = %self.request_id,
                collection = %checkpoint.collection,
                "erasure pass paused for manual confirmation"
            );
            return Ok(RunOutcome::Paused(checkpoint));
        }

        // Unreachable collections still appear in the result, with count 0.
        for address in &traversal.skipped {
            counts.insert(address.clone(), 0);
        }

        self.store.clear_paused(&self.request_id)?;
        info!(request = %self.request_id, collections = counts.len(), "erasure pass complete");
        Ok(RunOutcome::Completed(counts))
    }
}

enum ErasureOutcome {
    Complete(u64),
    Paused(ActionNeeded),
}

#[allow(clippy::too_many_arguments)]
async fn run_erasure_node(
    request_id: &str,
    graph: &DatasetGraph,
    connectors: &ConnectorMap,
    store: &dyn RequestStateStore,
    config: EngineConfig,
    policy: &Policy,
    node: &TraversalNode,
    access_rows: &[Row],
    inputs: &NodeInputs,
) -> Result<ErasureOutcome, EngineError> {
    // Resume path: a recorded count (including 0) means this node is done.
    if let Some(count) = store.get_erasure_count(request_id, &node.address)? {
        debug!(collection = %node.address, count, "reusing recorded erasure count");
        return Ok(ErasureOutcome::Complete(count));
    }

    let collection = graph
        .collection(&node.address)
        .ok_or_else(|| EngineError::State(anyhow!("collection {} missing from graph", node.address)))?;
    let payload = mask_payload_for(collection, policy, config.masking_strict);

    let name = node.address.collection.as_str();
    let attempt = store.next_attempt(request_id, name, ActionType::Erasure)?;
    store.append_log(
        request_id,
        ExecutionLogEntry::now(name, ActionType::Erasure, ExecutionLogStatus::InProcessing, attempt),
    )?;

    // No field matched the policy: nothing to mask, count 0, no connector call.
    if payload.is_empty() {
        store.record_erasure_count(request_id, &node.address, 0)?;
        store.append_log(
            request_id,
            ExecutionLogEntry::now(name, ActionType::Erasure, ExecutionLogStatus::Complete, attempt),
        )?;
        return Ok(ErasureOutcome::Complete(0));
    }

    let connector = connector_for(graph, connectors, &node.address)?;
    if connector.requires_manual_input() {
        return match store.get_manual_erasure_count(request_id, &node.address)? {
            Some(count) => {
                store.record_erasure_count(request_id, &node.address, count)?;
                clear_matching_pause(store, request_id, &node.address, ActionType::Erasure)?;
                store.append_log(
                    request_id,
                    ExecutionLogEntry::now(
                        name,
                        ActionType::Erasure,
                        ExecutionLogStatus::Complete,
                        attempt,
                    ),
                )?;
                Ok(ErasureOutcome::Complete(count))
            }
            None => {
                store.append_log(
                    request_id,
                    ExecutionLogEntry::now(
                        name,
                        ActionType::Erasure,
                        ExecutionLogStatus::Paused,
                        attempt,
                    ),
                )?;
                Ok(ErasureOutcome::Paused(ActionNeeded {
                    locators: erasure_locators(collection, access_rows, inputs),
                    get: None,
                    update: Some(payload.as_update_map()),
                }))
            }
        };
    }

    let masked = retry_connector_call(
        config.retry,
        store,
        request_id,
        name,
        ActionType::Erasure,
        attempt,
        || connector.mask(node, access_rows, &payload),
    )
    .await?;
    match masked {
        Ok(count) => {
            store.record_erasure_count(request_id, &node.address, count)?;
            store.append_log(
                request_id,
                ExecutionLogEntry::now(name, ActionType::Erasure, ExecutionLogStatus::Complete, attempt),
            )?;
            debug!(collection = %node.address, count, "erasure node complete");
            Ok(ErasureOutcome::Complete(count))
        }
        Err(source) => {
            store.append_log(
                request_id,
                ExecutionLogEntry::now(name, ActionType::Erasure, ExecutionLogStatus::Error, attempt),
            )?;
            Err(EngineError::Connector {
                collection: node.address.clone(),
                source,
            })
        }
    }
}

/// Build the per-collection mask payload: one instruction per field whose
/// data categories match an erasure rule, in field-name order. Under strict
/// masking every replacement is forced to null regardless of the rule's
/// declared strategy.
pub(crate) fn mask_payload_for(collection: &Collection, policy: &Policy, strict: bool) -> MaskPayload {
    let rules = policy.rules_for_action(ActionType::Erasure);
    let mut fields: Vec<_> = collection.fields.iter().collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));

    let mut instructions = Vec::new();
    for field in fields {
        let Some(rule) = rules.iter().find(|r| r.applies_to(&field.data_categories)) else {
            continue;
        };
        let replacement = if strict {
            Replacement::Null
        } else {
            match &rule.masking_strategy {
                MaskingStrategy::NullRewrite => Replacement::Null,
                MaskingStrategy::StringRewrite { rewrite_value } => {
                    Replacement::Fixed(serde_json::Value::String(rewrite_value.clone()))
                }
                MaskingStrategy::Hash => Replacement::Hash,
            }
        };
        instructions.push(MaskInstruction {
            field: field.name.clone(),
            replacement,
        });
    }
    MaskPayload { instructions }
}

#[cfg(test)]
mod tests {
    use super::*;

    use dsr_graph::Field;
    use dsr_types::{Rule, Target};

    fn erasure_policy(strategy: MaskingStrategy) -> Policy {
        Policy {
            key: "erasure_policy".to_string(),
            rules: vec![Rule {
                name: "erase user data".to_string(),
                action_type: ActionType::Erasure,
                masking_strategy: strategy,
                targets: vec![Target::new("user.contact")],
            }],
        }
    }

    fn customer_collection() -> Collection {
        Collection::new(
            "customer",
            vec![
                Field::new("id").with_primary_key(),
                Field::new("email").with_categories(&["user.contact.email"]),
                Field::new("name").with_categories(&["user.contact.name"]),
                Field::new("created_at").with_categories(&["system.operations"]),
            ],
        )
    }

    #[test]
    fn payload_covers_matched_fields_in_name_order() {
        let payload = mask_payload_for(
            &customer_collection(),
            &erasure_policy(MaskingStrategy::NullRewrite),
            false,
        );
        let fields: Vec<_> = payload.instructions.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "name"]);
        assert!(payload.is_destructive_only());
    }

    #[test]
    fn strict_masking_forces_null() {
        let payload = mask_payload_for(
            &customer_collection(),
            &erasure_policy(MaskingStrategy::StringRewrite {
                rewrite_value: "MASKED".to_string(),
            }),
            true,
        );
        assert!(payload.is_destructive_only());
    }

    #[test]
    fn lenient_masking_keeps_rule_strategy() {
        let payload = mask_payload_for(
            &customer_collection(),
            &erasure_policy(MaskingStrategy::StringRewrite {
                rewrite_value: "MASKED".to_string(),
            }),
            false,
        );
        assert!(!payload.is_destructive_only());
        assert_eq!(
            payload.instructions[0].replacement,
            Replacement::Fixed(serde_json::Value::String("MASKED".to_string()))
        );
    }

    #[test]
    fn unmatched_collection_yields_empty_payload() {
        let collection = Collection::new("audit", vec![Field::new("entry")]);
        let payload = mask_payload_for(
            &collection,
            &erasure_policy(MaskingStrategy::NullRewrite),
            true,
        );
        assert!(payload.is_empty());
    }
}
