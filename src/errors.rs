//! Error taxonomy for request execution.

use std::fmt;

use dsr_connectors::ConnectorExecutionError;
use dsr_graph::{CollectionAddress, GraphValidationError, UnsatisfiableGraphError};

/// Top-level failure of an access or erasure run.
///
/// Graph construction and planning problems surface as `Graph` and
/// `Unsatisfiable`; a connector that exhausted its retries (or failed
/// permanently) surfaces as `Connector` with the collection it was working
/// on. State-store failures are wrapped as `State` and carry whatever the
/// backing store reported.
#[derive(Debug)]
pub enum EngineError {
    Graph(GraphValidationError),
    Unsatisfiable(UnsatisfiableGraphError),
    Connector {
        collection: CollectionAddress,
        source: ConnectorExecutionError,
    },
    MissingConnection {
        collection: CollectionAddress,
        connection_key: String,
    },
    State(anyhow::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Graph(e) => write!(f, "invalid dataset graph: {}", e),
            EngineError::Unsatisfiable(e) => write!(f, "{}", e),
            EngineError::Connector { collection, source } => {
                write!(f, "connector failure on {}: {}", collection, source)
            }
            EngineError::MissingConnection {
                collection,
                connection_key,
            } => write!(
                f,
                "no connector registered for connection '{}' (needed by {})",
                connection_key, collection
            ),
            EngineError::State(e) => write!(f, "state store failure: {:#}", e),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Graph(e) => Some(e),
            EngineError::Unsatisfiable(e) => Some(e),
            EngineError::Connector { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<GraphValidationError> for EngineError {
    fn from(e: GraphValidationError) -> Self {
        EngineError::Graph(e)
    }
}

impl From<UnsatisfiableGraphError> for EngineError {
    fn from(e: UnsatisfiableGraphError) -> Self {
        EngineError::Unsatisfiable(e)
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::State(e)
    }
}
