//! Graph-level error types.
//!
//! Both errors here are fatal and never retried: a malformed graph is a
//! configuration problem surfaced at build time, and a mandatory cycle cannot
//! be executed at all.

use std::fmt;

use crate::config::{CollectionAddress, FieldAddress};

/// A declared reference graph is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    /// A collection address string did not parse as `dataset:collection`.
    MalformedAddress(String),
    /// Two datasets share a name, so their collection addresses collide.
    DuplicateDataset(String),
    /// Two collections within one dataset share a name.
    DuplicateCollection {
        /// Dataset containing the duplicates.
        dataset: String,
        /// The duplicated collection name.
        collection: String,
    },
    /// A reference points at a collection that does not exist.
    UnknownReferencedCollection {
        /// The field declaring the reference.
        from: FieldAddress,
        /// The missing collection.
        target: CollectionAddress,
    },
    /// A reference points at a field that does not exist on its collection.
    UnknownReferencedField {
        /// The field declaring the reference.
        from: FieldAddress,
        /// The missing field.
        target: FieldAddress,
    },
}

impl fmt::Display for GraphValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValidationError::MalformedAddress(s) => {
                write!(f, "malformed collection address '{}' (expected 'dataset:collection')", s)
            }
            GraphValidationError::DuplicateDataset(name) => {
                write!(f, "duplicate dataset name '{}'", name)
            }
            GraphValidationError::DuplicateCollection { dataset, collection } => {
                write!(
                    f,
                    "dataset '{}' declares collection '{}' more than once",
                    dataset, collection
                )
            }
            GraphValidationError::UnknownReferencedCollection { from, target } => {
                write!(
                    f,
                    "field {} references unknown collection {}",
                    from, target
                )
            }
            GraphValidationError::UnknownReferencedField { from, target } => {
                write!(f, "field {} references unknown field {}", from, target)
            }
        }
    }
}

impl std::error::Error for GraphValidationError {}

/// A cycle among mandatory reference edges makes the graph unexecutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiableGraphError {
    /// Collections participating in the unresolvable cycle.
    pub cycle: Vec<CollectionAddress>,
}

impl fmt::Display for UnsatisfiableGraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.cycle.iter().map(|a| a.to_string()).collect();
        write!(
            f,
            "cycle among mandatory references, cannot order collections: [{}]",
            names.join(", ")
        )
    }
}

impl std::error::Error for UnsatisfiableGraphError {}
