//! Validated, immutable dataset reference graph.

use std::collections::BTreeMap;

use crate::config::{Collection, CollectionAddress, Dataset, FieldAddress, ReferenceDirection};
use crate::errors::GraphValidationError;

/// A directed data-dependency edge: values of `from` locate rows of `to`'s
/// collection via the `to` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Upstream field producing values.
    pub from: FieldAddress,
    /// Downstream field consuming values as locators.
    pub to: FieldAddress,
    /// Droppable at plan time to break a cycle.
    pub optional: bool,
}

/// The set of all collections plus the reference edges between their fields.
///
/// Built once per request from the datasets attached to the in-scope
/// connections; immutable after build, so it is thread-safe by construction.
#[derive(Debug, Clone)]
pub struct DatasetGraph {
    collections: BTreeMap<CollectionAddress, Collection>,
    connection_keys: BTreeMap<CollectionAddress, String>,
    edges: Vec<Edge>,
}

impl DatasetGraph {
    /// Build and validate a graph from datasets.
    ///
    /// Fails if two datasets share a name, two collections within one dataset
    /// share a name, or any declared reference points at a collection or
    /// field that does not exist.
    pub fn new(datasets: Vec<Dataset>) -> Result<Self, GraphValidationError> {
        let mut collections: BTreeMap<CollectionAddress, Collection> = BTreeMap::new();
        let mut connection_keys: BTreeMap<CollectionAddress, String> = BTreeMap::new();

        let mut seen_datasets: Vec<&str> = Vec::new();
        for dataset in &datasets {
            if seen_datasets.contains(&dataset.name.as_str()) {
                return Err(GraphValidationError::DuplicateDataset(dataset.name.clone()));
            }
            seen_datasets.push(&dataset.name);

            for collection in &dataset.collections {
                let address = CollectionAddress::new(&dataset.name, &collection.name);
                if collections.contains_key(&address) {
                    return Err(GraphValidationError::DuplicateCollection {
                        dataset: dataset.name.clone(),
                        collection: collection.name.clone(),
                    });
                }
                connection_keys.insert(address.clone(), dataset.connection_key.clone());
                collections.insert(address, collection.clone());
            }
        }

        // Resolve declared references into directed edges, validating that
        // both endpoints exist.
        let mut edges = Vec::new();
        for (address, collection) in &collections {
            for field in &collection.fields {
                let local = address.field(&field.name);
                for reference in &field.references {
                    let target_collection = collections
                        .get(&reference.target.collection)
                        .ok_or_else(|| GraphValidationError::UnknownReferencedCollection {
                            from: local.clone(),
                            target: reference.target.collection.clone(),
                        })?;
                    if target_collection.field(&reference.target.field).is_none() {
                        return Err(GraphValidationError::UnknownReferencedField {
                            from: local.clone(),
                            target: reference.target.clone(),
                        });
                    }

                    let (from, to) = match reference.direction {
                        ReferenceDirection::From => (reference.target.clone(), local.clone()),
                        ReferenceDirection::To => (local.clone(), reference.target.clone()),
                    };
                    // A self-referencing edge can never be ordered; treat it
                    // as optional regardless of declaration.
                    let optional = reference.optional || from.collection == to.collection;
                    edges.push(Edge { from, to, optional });
                }
            }
        }

        Ok(Self {
            collections,
            connection_keys,
            edges,
        })
    }

    /// All collections, keyed by address.
    pub fn collections(&self) -> &BTreeMap<CollectionAddress, Collection> {
        &self.collections
    }

    /// Look up one collection.
    pub fn collection(&self, address: &CollectionAddress) -> Option<&Collection> {
        self.collections.get(address)
    }

    /// All resolved edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Connection key the collection executes against.
    pub fn connection_key(&self, address: &CollectionAddress) -> Option<&str> {
        self.connection_keys.get(address).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Field;

    fn customer_orders_dataset() -> Dataset {
        let customer_id = CollectionAddress::new("db", "customer").field("id");
        Dataset::new(
            "db",
            "db_connection",
            vec![
                Collection::new(
                    "customer",
                    vec![
                        Field::new("id").with_primary_key(),
                        Field::new("email").with_identity("email"),
                    ],
                ),
                Collection::new(
                    "orders",
                    vec![
                        Field::new("id").with_primary_key(),
                        Field::new("customer_id")
                            .with_reference(customer_id, ReferenceDirection::From),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn test_build_resolves_edges() {
        let graph = DatasetGraph::new(vec![customer_orders_dataset()]).unwrap();
        assert_eq!(graph.collections().len(), 2);
        assert_eq!(graph.edges().len(), 1);

        let edge = &graph.edges()[0];
        assert_eq!(edge.from.to_string(), "db:customer:id");
        assert_eq!(edge.to.to_string(), "db:orders:customer_id");
        assert!(!edge.optional);

        let customer = CollectionAddress::new("db", "customer");
        assert_eq!(graph.connection_key(&customer), Some("db_connection"));
    }

    #[test]
    fn test_unknown_collection_rejected() {
        let mut dataset = customer_orders_dataset();
        dataset.collections[1].fields.push(
            Field::new("ghost_id").with_reference(
                CollectionAddress::new("db", "ghost").field("id"),
                ReferenceDirection::From,
            ),
        );
        let err = DatasetGraph::new(vec![dataset]).unwrap_err();
        assert!(matches!(
            err,
            GraphValidationError::UnknownReferencedCollection { .. }
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut dataset = customer_orders_dataset();
        dataset.collections[1].fields.push(
            Field::new("bad_ref").with_reference(
                CollectionAddress::new("db", "customer").field("no_such_field"),
                ReferenceDirection::From,
            ),
        );
        let err = DatasetGraph::new(vec![dataset]).unwrap_err();
        assert!(matches!(
            err,
            GraphValidationError::UnknownReferencedField { .. }
        ));
    }

    #[test]
    fn test_duplicate_collection_rejected() {
        let mut dataset = customer_orders_dataset();
        dataset
            .collections
            .push(Collection::new("customer", vec![Field::new("id")]));
        let err = DatasetGraph::new(vec![dataset]).unwrap_err();
        assert!(matches!(
            err,
            GraphValidationError::DuplicateCollection { .. }
        ));
    }

    #[test]
    fn test_self_reference_is_implicitly_optional() {
        let parent = CollectionAddress::new("db", "employee").field("id");
        let dataset = Dataset::new(
            "db",
            "db_connection",
            vec![Collection::new(
                "employee",
                vec![
                    Field::new("id").with_primary_key(),
                    Field::new("email").with_identity("email"),
                    Field::new("manager_id").with_reference(parent, ReferenceDirection::From),
                ],
            )],
        );
        let graph = DatasetGraph::new(vec![dataset]).unwrap();
        assert!(graph.edges()[0].optional);
    }
}
