//! Paused checkpoints and execution log entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dsr_graph::CollectionAddress;
use dsr_types::{ActionType, ExecutionLogStatus};

/// What a manual node still needs before the pass can proceed.
///
/// For an access pause `get` lists the fields to fetch; for an erasure pause
/// `update` maps fields to the values they must be rewritten to. Exactly one
/// of the two is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNeeded {
    /// Locator values available to find the records, field -> candidate values.
    pub locators: BTreeMap<String, Vec<Value>>,
    /// Fields whose values must be fetched (access).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<Vec<String>>,
    /// Field -> replacement value that must be written (erasure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<BTreeMap<String, Value>>,
}

/// Where and why a request suspended. At most one exists per request; a new
/// pause overwrites the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PausedCheckpoint {
    /// Collection the pass suspended at.
    pub collection: CollectionAddress,
    /// Which pass was suspended.
    pub step: ActionType,
    /// What an external actor must supply to resume.
    pub action_needed: Vec<ActionNeeded>,
}

/// Immutable record of one status transition for one collection visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// Collection name (without dataset prefix, matching operator views).
    pub collection_name: String,
    /// Pass the transition belongs to.
    pub step: ActionType,
    /// New status.
    pub status: ExecutionLogStatus,
    /// 1-based attempt ordinal for this collection within this pass.
    pub attempt: u32,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl ExecutionLogEntry {
    /// Build an entry timestamped now.
    pub fn now(
        collection_name: impl Into<String>,
        step: ActionType,
        status: ExecutionLogStatus,
        attempt: u32,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            step,
            status,
            attempt,
            timestamp: Utc::now(),
        }
    }
}
