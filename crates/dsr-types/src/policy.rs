//! Read-only policy model consulted by the erasure pass.
//!
//! A policy is external configuration owned by the surrounding system; the
//! engine only reads it to decide, per collection and per field, whether and
//! how a matching record is mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::ActionType;

/// A named set of rules applied to a privacy request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Stable policy key, e.g. "default_erasure_policy".
    pub key: String,
    /// Rules attached to this policy.
    pub rules: Vec<Rule>,
}

impl Policy {
    /// Rules applicable to the given action type.
    pub fn rules_for_action(&self, action: ActionType) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.action_type == action)
            .collect()
    }
}

/// A single policy rule: for one action type, which data categories are in
/// scope and how matching fields are rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Human-readable rule name.
    pub name: String,
    /// The pass this rule participates in.
    pub action_type: ActionType,
    /// How matched fields are rewritten during erasure.
    pub masking_strategy: MaskingStrategy,
    /// Data-category targets this rule covers.
    pub targets: Vec<Target>,
}

impl Rule {
    /// Whether this rule covers a field carrying the given data categories.
    ///
    /// Category matching is a prefix match on the dotted category tree: a
    /// target of `user` covers `user.contact.email`.
    pub fn applies_to(&self, field_categories: &[String]) -> bool {
        self.targets.iter().any(|t| {
            field_categories.iter().any(|c| {
                c == &t.data_category || c.starts_with(&format!("{}.", t.data_category))
            })
        })
    }
}

/// A data-category target within a rule, e.g. `user.contact`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Dotted data-category path.
    pub data_category: String,
}

impl Target {
    /// Convenience constructor.
    pub fn new(data_category: impl Into<String>) -> Self {
        Self {
            data_category: data_category.into(),
        }
    }
}

/// How a matched field's value is rewritten during erasure.
///
/// Under strict masking only [`MaskingStrategy::NullRewrite`] semantics are
/// permitted; the executor forces every replacement to null before a
/// connector sees the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum MaskingStrategy {
    /// Replace the value with null (destructive).
    NullRewrite,
    /// Replace the value with a fixed string, e.g. "MASKED".
    StringRewrite {
        /// Replacement value.
        rewrite_value: String,
    },
    /// Replace the value with a salted SHA-256 hex digest of the original.
    Hash,
}

impl MaskingStrategy {
    /// Apply this strategy to a single original value.
    pub fn mask(&self, original: &Value) -> Value {
        match self {
            MaskingStrategy::NullRewrite => Value::Null,
            MaskingStrategy::StringRewrite { rewrite_value } => {
                Value::String(rewrite_value.clone())
            }
            MaskingStrategy::Hash => Value::String(hash_value(original)),
        }
    }
}

/// SHA-256 hex digest of a JSON value's canonical string form.
pub fn hash_value(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    hex::encode(hasher.finalize())
}
