//! Connector contract and connection-type registry.
//!
//! The engine talks to every external system through one narrow interface,
//! [`Connector`]: retrieve rows by locator values, mask rows per a payload,
//! and test the connection. Concrete request/response logic (SQL execution,
//! HTTP calls) lives behind implementations owned by the surrounding system;
//! this crate ships the two the engine itself needs:
//!
//! - [`ManualConnector`]: never retrieves on its own; drives the
//!   pause/resume protocol for human-supplied data
//! - [`MockConnector`]: scripted rows and failures for tests
//!
//! The [`registry`] module is the read-only catalog of connection types and
//! SaaS connector templates, used to answer "what types exist", "which
//! actions does a type support", and "what secret fields does it need" -
//! never to inspect actual secret values.

pub mod manual;
pub mod mask;
pub mod mock;
pub mod registry;
pub mod template;

pub use manual::ManualConnector;
pub use mask::{MaskInstruction, MaskPayload, Replacement};
pub use mock::MockConnector;
pub use registry::{ConnectionSystemTypeMap, ConnectionType, ConnectorRegistry, SystemType};
pub use template::{ConnectorTemplate, SaasTemplateConfig};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use dsr_graph::TraversalNode;
use dsr_types::Row;

/// Locator inputs for one node visit: field name -> candidate values.
///
/// A node is visited once per pass but may execute against multiple locator
/// values gathered from seeds and predecessor rows in one connector call.
pub type NodeInputs = BTreeMap<String, Vec<Value>>;

/// How a connector invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network timeout, rate limit - safe to retry with backoff.
    Transient,
    /// Bad credentials, unsupported operation - retrying cannot help.
    Permanent,
}

/// A failed retrieve/mask/test call against an external system.
#[derive(Debug, Clone)]
pub struct ConnectorExecutionError {
    /// Whether a retry may succeed.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl ConnectorExecutionError {
    /// A retryable failure (timeout, rate limit).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// A non-retryable failure.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    /// Whether the engine should retry this failure.
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

impl fmt::Display for ConnectorExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Transient => write!(f, "transient connector failure: {}", self.message),
            FailureKind::Permanent => write!(f, "connector failure: {}", self.message),
        }
    }
}

impl std::error::Error for ConnectorExecutionError {}

/// The single polymorphic interface the engine uses to reach any external
/// system: database, SaaS API, manual process, or email-based request.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Retrieve the rows of `node`'s collection matching the locator inputs.
    async fn retrieve(
        &self,
        node: &TraversalNode,
        inputs: &NodeInputs,
    ) -> Result<Vec<Row>, ConnectorExecutionError>;

    /// Mutate the given rows per the mask payload; returns the number of
    /// records affected. The call is atomic from the engine's perspective.
    async fn mask(
        &self,
        node: &TraversalNode,
        rows: &[Row],
        payload: &MaskPayload,
    ) -> Result<u64, ConnectorExecutionError>;

    /// Verify the connection is usable.
    async fn test_connection(&self) -> Result<(), ConnectorExecutionError>;

    /// Whether this connector's data can only be supplied by a human,
    /// triggering the pause/resume protocol instead of a retrieve call.
    fn requires_manual_input(&self) -> bool {
        false
    }
}
