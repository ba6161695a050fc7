//! Shared types for the dsr-engine workspace.
//!
//! This crate provides foundational types used across multiple crates in the
//! workspace, breaking circular dependency chains.
//!
//! ## Policy Types
//!
//! The [`policy`] module contains the read-only policy model consulted by the
//! erasure pass:
//! - [`Policy`](policy::Policy) - A named set of rules for a request
//! - [`Rule`](policy::Rule) - Per-action masking configuration with targets
//! - [`MaskingStrategy`](policy::MaskingStrategy) - How a matched field is rewritten

pub mod policy;

// Re-export commonly used policy types at crate root
pub use policy::{MaskingStrategy, Policy, Rule, Target};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single retrieved or produced record: field name -> value.
///
/// Rows are schemaless JSON maps because collections span heterogeneous
/// stores (SQL tables, SaaS endpoints, manually supplied data).
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Externally supplied identifying values used as initial locators,
/// e.g. `{"email": "a@example.com"}`.
///
/// Keyed with a BTreeMap so iteration order (and therefore traversal root
/// discovery) is deterministic.
pub type IdentityMap = BTreeMap<String, serde_json::Value>;

/// The kind of pass being executed for a privacy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Retrieve a data subject's rows from every reachable collection.
    Access,
    /// Mask or delete a data subject's rows per policy.
    Erasure,
    /// Record a consent preference downstream (email connectors only).
    Consent,
}

impl ActionType {
    /// Get a short name for this action type.
    pub fn short_name(&self) -> &'static str {
        match self {
            ActionType::Access => "access",
            ActionType::Erasure => "erasure",
            ActionType::Consent => "consent",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Status of a single collection visit within a pass.
///
/// Transitions are append-only in the execution log: a node that pauses and
/// later completes produces `in_processing`, `paused`, `in_processing`,
/// `complete` entries, never an overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLogStatus {
    /// Node execution has started for this attempt.
    InProcessing,
    /// Node is waiting on manual input; the pass has been suspended.
    Paused,
    /// A transient connector failure is being retried.
    Retrying,
    /// Node finished; rows or a count were recorded.
    Complete,
    /// Retries were exhausted; the pass failed at this node.
    Error,
    /// Collection was unreachable from the seed identities and excluded.
    Skipped,
}

impl fmt::Display for ExecutionLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionLogStatus::InProcessing => "in_processing",
            ExecutionLogStatus::Paused => "paused",
            ExecutionLogStatus::Retrying => "retrying",
            ExecutionLogStatus::Complete => "complete",
            ExecutionLogStatus::Error => "error",
            ExecutionLogStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Configuration for retry behavior on connector operations.
#[derive(Debug, Copy, Clone)]
pub struct RetryConfig {
    /// Number of retry attempts.
    pub retries: usize,
    /// Initial backoff duration between retries.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// Create a new RetryConfig with the specified parameters.
    pub fn new(retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(5000),
        }
    }
}
