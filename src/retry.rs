//! Bounded exponential backoff around connector calls.

use std::future::Future;

use tracing::warn;

use dsr_connectors::ConnectorExecutionError;
use dsr_state::{ExecutionLogEntry, RequestStateStore};
use dsr_types::{ActionType, ExecutionLogStatus, RetryConfig};

/// Invoke a connector operation, retrying transient failures with exponential
/// backoff up to `cfg.retries` re-attempts. Each re-attempt appends a
/// `retrying` entry to the execution log under the same attempt ordinal.
///
/// The outer `Result` is a state-store failure while logging; the inner one is
/// the connector's own verdict after retries were exhausted (or the first
/// permanent failure, which is never retried).
pub(crate) async fn retry_connector_call<T, F, Fut>(
    cfg: RetryConfig,
    store: &dyn RequestStateStore,
    request_id: &str,
    collection_name: &str,
    step: ActionType,
    attempt: u32,
    mut f: F,
) -> anyhow::Result<Result<T, ConnectorExecutionError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorExecutionError>>,
{
    let mut retries = 0usize;
    let mut backoff = cfg.initial_backoff;
    loop {
        match f().await {
            Ok(value) => return Ok(Ok(value)),
            Err(e) if e.is_transient() && retries < cfg.retries => {
                retries += 1;
                warn!(
                    collection = collection_name,
                    retry = retries,
                    error = %e,
                    "transient connector failure, backing off"
                );
                store.append_log(
                    request_id,
                    ExecutionLogEntry::now(
                        collection_name,
                        step,
                        ExecutionLogStatus::Retrying,
                        attempt,
                    ),
                )?;
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, cfg.max_backoff);
            }
            Err(e) => return Ok(Err(e)),
        }
    }
}
