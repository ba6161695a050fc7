//! Mask payloads sent to connectors during erasure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dsr_types::policy::hash_value;

/// Per-field replacement instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Replacement {
    /// Replace with null (destructive; the only form allowed under strict
    /// masking).
    Null,
    /// Replace with a fixed value.
    Fixed(Value),
    /// Replace with a salted hash of the original value, computed per row by
    /// the connector.
    Hash,
}

impl Replacement {
    /// Apply to one original value.
    pub fn apply(&self, original: &Value) -> Value {
        match self {
            Replacement::Null => Value::Null,
            Replacement::Fixed(v) => v.clone(),
            Replacement::Hash => Value::String(hash_value(original)),
        }
    }

    /// Whether this replacement destroys the value rather than transforming it.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Replacement::Null)
    }
}

/// One field to rewrite and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskInstruction {
    /// Field to rewrite.
    pub field: String,
    /// Replacement to apply.
    pub replacement: Replacement,
}

/// The full per-collection mutation payload for one erasure node visit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MaskPayload {
    /// Instructions, one per matched field, in field-name order.
    pub instructions: Vec<MaskInstruction>,
}

impl MaskPayload {
    /// Whether there is nothing to mutate.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether every instruction is destructive (null). Strict masking
    /// requires this to hold before a connector is invoked.
    pub fn is_destructive_only(&self) -> bool {
        self.instructions.iter().all(|i| i.replacement.is_destructive())
    }

    /// Render the payload as a field -> concrete value map for a human
    /// operator. `Hash` renders as null: a human fulfilling a manual erasure
    /// destroys the data rather than transforming it.
    pub fn as_update_map(&self) -> BTreeMap<String, Value> {
        self.instructions
            .iter()
            .map(|i| {
                let value = match &i.replacement {
                    Replacement::Fixed(v) => v.clone(),
                    Replacement::Null | Replacement::Hash => Value::Null,
                };
                (i.field.clone(), value)
            })
            .collect()
    }
}
