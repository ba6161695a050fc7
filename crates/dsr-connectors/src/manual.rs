//! Manual-process connector.
//!
//! A manual collection's data can only be supplied or confirmed by a human.
//! The executors check [`Connector::requires_manual_input`] before invoking
//! retrieve/mask, so reaching either method here means the pause protocol was
//! bypassed - that is a permanent error, not something to retry.

use async_trait::async_trait;

use dsr_graph::TraversalNode;
use dsr_types::Row;

use crate::{Connector, ConnectorExecutionError, MaskPayload, NodeInputs};

/// Connector for collections fulfilled by a human operator.
#[derive(Debug, Default)]
pub struct ManualConnector;

impl ManualConnector {
    /// Create a manual connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for ManualConnector {
    async fn retrieve(
        &self,
        node: &TraversalNode,
        _inputs: &NodeInputs,
    ) -> Result<Vec<Row>, ConnectorExecutionError> {
        Err(ConnectorExecutionError::permanent(format!(
            "manual collection {} cannot be retrieved autonomously",
            node.address
        )))
    }

    async fn mask(
        &self,
        node: &TraversalNode,
        _rows: &[Row],
        _payload: &MaskPayload,
    ) -> Result<u64, ConnectorExecutionError> {
        Err(ConnectorExecutionError::permanent(format!(
            "manual collection {} cannot be masked autonomously",
            node.address
        )))
    }

    async fn test_connection(&self) -> Result<(), ConnectorExecutionError> {
        Ok(())
    }

    fn requires_manual_input(&self) -> bool {
        true
    }
}
