//! Dataset, collection, and field declarations.
//!
//! These types describe what the surrounding system attaches to a request's
//! in-scope connections: named collections of fields, with field-level
//! references declaring how values flow between collections.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GraphValidationError;

/// Identity of a collection: `(dataset_name, collection_name)`.
///
/// The string form `dataset:collection` is the universal key throughout the
/// engine (state store, result maps, execution log).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionAddress {
    /// Dataset the collection belongs to.
    pub dataset: String,
    /// Collection name within the dataset.
    pub collection: String,
}

impl CollectionAddress {
    /// Build an address from its two components.
    pub fn new(dataset: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            collection: collection.into(),
        }
    }

    /// Parse the `dataset:collection` string form back into an address.
    pub fn from_string(s: &str) -> Result<Self, GraphValidationError> {
        match s.split_once(':') {
            Some((dataset, collection)) if !dataset.is_empty() && !collection.is_empty() => {
                Ok(Self::new(dataset, collection))
            }
            _ => Err(GraphValidationError::MalformedAddress(s.to_string())),
        }
    }

    /// Address of a field on this collection.
    pub fn field(&self, name: impl Into<String>) -> FieldAddress {
        FieldAddress {
            collection: self.clone(),
            field: name.into(),
        }
    }
}

impl fmt::Display for CollectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.collection)
    }
}

/// Identity of a field: collection address plus field name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldAddress {
    /// The owning collection.
    pub collection: CollectionAddress,
    /// Field name.
    pub field: String,
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.field)
    }
}

/// Which way a declared reference reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDirection {
    /// This field's values come *from* the target field (target is upstream).
    From,
    /// This field's values feed *to* the target field (target is downstream).
    To,
}

/// A declared data-dependency between two fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// The other end of the dependency.
    pub target: FieldAddress,
    /// Direction the value flows, relative to the declaring field.
    pub direction: ReferenceDirection,
    /// Optional edges may be dropped to break a cycle at plan time.
    #[serde(default)]
    pub optional: bool,
}

/// A field within a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Seed-identity key this field matches (e.g. "email"), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Dotted data categories carried by this field (e.g. "user.contact.email").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_categories: Vec<String>,
    /// Whether this field is part of the collection's primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Outbound references to fields in other collections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

impl Field {
    /// A plain field with no identity, categories, or references.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: None,
            data_categories: Vec::new(),
            primary_key: false,
            references: Vec::new(),
        }
    }

    /// Mark this field as matching a seed-identity key.
    pub fn with_identity(mut self, key: impl Into<String>) -> Self {
        self.identity = Some(key.into());
        self
    }

    /// Attach data categories.
    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.data_categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Mark this field as (part of) the primary key.
    pub fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Declare a mandatory reference.
    pub fn with_reference(mut self, target: FieldAddress, direction: ReferenceDirection) -> Self {
        self.references.push(Reference {
            target,
            direction,
            optional: false,
        });
        self
    }

    /// Declare an optional reference (droppable at plan time to break cycles).
    pub fn with_optional_reference(
        mut self,
        target: FieldAddress,
        direction: ReferenceDirection,
    ) -> Self {
        self.references.push(Reference {
            target,
            direction,
            optional: true,
        });
        self
    }
}

/// A named grouping of fields within one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name, unique within its dataset.
    pub name: String,
    /// Declared fields.
    pub fields: Vec<Field>,
}

impl Collection {
    /// Build a collection from its fields.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of every declared field, in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Names of the primary-key fields, in declaration order.
    pub fn primary_key_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.clone())
            .collect()
    }
}

/// A dataset: a named set of collections bound to one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset name (first half of every collection address within it).
    pub name: String,
    /// Key of the connection config this dataset executes against.
    pub connection_key: String,
    /// Collections in the dataset.
    pub collections: Vec<Collection>,
}

impl Dataset {
    /// Build a dataset.
    pub fn new(
        name: impl Into<String>,
        connection_key: impl Into<String>,
        collections: Vec<Collection>,
    ) -> Self {
        Self {
            name: name.into(),
            connection_key: connection_key.into(),
            collections,
        }
    }
}
