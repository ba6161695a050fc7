//! Locator assembly: turning seed identities and upstream rows into the
//! inputs a connector filters by.

use std::collections::BTreeMap;

use serde_json::Value;

use dsr_connectors::NodeInputs;
use dsr_graph::{Collection, CollectionAddress, TraversalNode};
use dsr_types::{IdentityMap, Row};

/// Gather the locator inputs for a node: every identity field matched by a
/// seed contributes the seed value, and every incoming edge contributes the
/// projection of its source field over the predecessor's recorded rows.
///
/// Values are de-duplicated per field while keeping first-seen order, and
/// nulls from upstream rows are discarded.
pub fn gather_node_inputs(
    node: &TraversalNode,
    seeds: &IdentityMap,
    results: &BTreeMap<CollectionAddress, Vec<Row>>,
) -> NodeInputs {
    let mut inputs = NodeInputs::new();
    for (seed_key, field_name) in &node.identity_fields {
        if let Some(value) = seeds.get(seed_key) {
            push_unique(inputs.entry(field_name.clone()).or_default(), value.clone());
        }
    }
    for edge in &node.incoming {
        let Some(rows) = results.get(&edge.source.collection) else {
            continue;
        };
        for row in rows {
            match row.get(&edge.source.field) {
                Some(value) if !value.is_null() => {
                    push_unique(inputs.entry(edge.local_field.clone()).or_default(), value.clone());
                }
                _ => {}
            }
        }
    }
    inputs
}

/// Locators identifying the exact rows an erasure touches: the collection's
/// primary-key fields projected over the rows the access pass retrieved.
/// Falls back to the node's locator inputs when no primary key is declared
/// or no rows were retrieved.
pub fn erasure_locators(collection: &Collection, rows: &[Row], inputs: &NodeInputs) -> NodeInputs {
    let pk_fields = collection.primary_key_fields();
    if !pk_fields.is_empty() {
        let mut locators = NodeInputs::new();
        for field in &pk_fields {
            for row in rows {
                match row.get(field) {
                    Some(value) if !value.is_null() => {
                        push_unique(locators.entry(field.clone()).or_default(), value.clone());
                    }
                    _ => {}
                }
            }
        }
        if !locators.is_empty() {
            return locators;
        }
    }
    inputs.clone()
}

fn push_unique(values: &mut Vec<Value>, value: Value) {
    if !values.contains(&value) {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use dsr_graph::{Field, IncomingEdge};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn orders_node() -> TraversalNode {
        TraversalNode {
            address: CollectionAddress::new("db", "orders"),
            incoming: vec![IncomingEdge {
                source: CollectionAddress::new("db", "customer").field("id"),
                local_field: "customer_id".to_string(),
                optional: false,
            }],
            identity_fields: vec![],
        }
    }

    #[test]
    fn projects_upstream_rows_without_duplicates_or_nulls() {
        let mut results = BTreeMap::new();
        results.insert(
            CollectionAddress::new("db", "customer"),
            vec![
                row(&[("id", json!(1))]),
                row(&[("id", json!(1))]),
                row(&[("id", Value::Null)]),
                row(&[("id", json!(2))]),
            ],
        );

        let inputs = gather_node_inputs(&orders_node(), &IdentityMap::new(), &results);
        assert_eq!(inputs["customer_id"], vec![json!(1), json!(2)]);
    }

    #[test]
    fn seeds_feed_identity_fields() {
        let node = TraversalNode {
            address: CollectionAddress::new("db", "customer"),
            incoming: vec![],
            identity_fields: vec![("email".to_string(), "email".to_string())],
        };
        let mut seeds = IdentityMap::new();
        seeds.insert("email".to_string(), json!("a@example.com"));

        let inputs = gather_node_inputs(&node, &seeds, &BTreeMap::new());
        assert_eq!(inputs["email"], vec![json!("a@example.com")]);
    }

    #[test]
    fn missing_predecessor_results_contribute_nothing() {
        let inputs = gather_node_inputs(&orders_node(), &IdentityMap::new(), &BTreeMap::new());
        assert!(inputs.is_empty());
    }

    #[test]
    fn erasure_locators_prefer_primary_keys() {
        let collection = Collection::new(
            "orders",
            vec![
                Field::new("id").with_primary_key(),
                Field::new("customer_id"),
            ],
        );
        let rows = vec![row(&[("id", json!(10))]), row(&[("id", json!(11))])];
        let mut inputs = NodeInputs::new();
        inputs.insert("customer_id".to_string(), vec![json!(1)]);

        let locators = erasure_locators(&collection, &rows, &inputs);
        assert_eq!(locators["id"], vec![json!(10), json!(11)]);
        assert!(!locators.contains_key("customer_id"));
    }

    #[test]
    fn erasure_locators_fall_back_to_inputs() {
        let collection = Collection::new("orders", vec![Field::new("customer_id")]);
        let mut inputs = NodeInputs::new();
        inputs.insert("customer_id".to_string(), vec![json!(1)]);

        let locators = erasure_locators(&collection, &[], &inputs);
        assert_eq!(locators, inputs);
    }
}
