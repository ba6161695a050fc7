//! Dataset reference graph and traversal planner.
//!
//! This crate models collections, fields, and the field-level reference edges
//! between them, and computes the dependency-ordered traversal a pass
//! executes:
//!
//! - [`config`]: datasets, collections, fields, and declared references
//! - [`graph`]: [`DatasetGraph`] - validated, immutable reference graph
//! - [`traversal`]: [`Traversal`] - reachability + deterministic topological
//!   order with optional-edge cycle breaking
//!
//! Everything here is pure data plus validation; no I/O. A graph is immutable
//! after build and a traversal is re-derived from it on every resume, so
//! nothing computed here can go stale across pause/resume boundaries.

pub mod config;
pub mod errors;
pub mod graph;
pub mod traversal;

// Re-export the main types at crate root
pub use config::{
    Collection, CollectionAddress, Dataset, Field, FieldAddress, Reference, ReferenceDirection,
};
pub use errors::{GraphValidationError, UnsatisfiableGraphError};
pub use graph::{DatasetGraph, Edge};
pub use traversal::{IncomingEdge, Traversal, TraversalNode};
