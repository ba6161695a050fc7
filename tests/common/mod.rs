//! Shared fixtures: a small e-commerce dataset graph, a manual-storage
//! dataset, scripted connectors, and policy/config helpers.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use dsr_connectors::{mock::row, ManualConnector, MockConnector};
use dsr_engine::{ConnectorMap, EngineConfig};
use dsr_graph::{
    Collection, CollectionAddress, Dataset, DatasetGraph, Field, ReferenceDirection,
};
use dsr_types::{
    ActionType, IdentityMap, MaskingStrategy, Policy, RetryConfig, Rule, Target,
};

pub fn addr(dataset: &str, collection: &str) -> CollectionAddress {
    CollectionAddress::new(dataset, collection)
}

/// An e-commerce style dataset: customer, orders, address, payment_card,
/// plus a `report` collection no seed can reach.
pub fn postgres_dataset() -> Dataset {
    let customer = addr("postgres_example", "customer");
    let address = addr("postgres_example", "address");
    Dataset::new(
        "postgres_example",
        "postgres_db",
        vec![
            Collection::new(
                "customer",
                vec![
                    Field::new("id").with_primary_key(),
                    Field::new("email")
                        .with_identity("email")
                        .with_categories(&["user.contact.email"]),
                    Field::new("name").with_categories(&["user.contact.name"]),
                    Field::new("address_id")
                        .with_reference(address.field("id"), ReferenceDirection::To),
                ],
            ),
            Collection::new(
                "address",
                vec![
                    Field::new("id").with_primary_key(),
                    Field::new("street").with_categories(&["user.contact.address.street"]),
                    Field::new("city").with_categories(&["user.contact.address.city"]),
                ],
            ),
            Collection::new(
                "orders",
                vec![
                    Field::new("id").with_primary_key(),
                    Field::new("customer_id")
                        .with_reference(customer.field("id"), ReferenceDirection::From),
                    Field::new("shipping_address_id")
                        .with_reference(address.field("id"), ReferenceDirection::To),
                ],
            ),
            Collection::new(
                "payment_card",
                vec![
                    Field::new("id").with_primary_key(),
                    Field::new("customer_id")
                        .with_reference(customer.field("id"), ReferenceDirection::From),
                    Field::new("ccn").with_categories(&["user.financial.credit_card_number"]),
                ],
            ),
            Collection::new("report", vec![Field::new("id").with_primary_key()]),
        ],
    )
}

/// Human-backed storage: a storage unit findable by email and a filing
/// cabinet findable by customer id.
pub fn manual_dataset() -> Dataset {
    let customer = addr("postgres_example", "customer");
    Dataset::new(
        "manual_example",
        "manual_connection",
        vec![
            Collection::new(
                "filing_cabinet",
                vec![
                    Field::new("id").with_primary_key(),
                    Field::new("customer_id")
                        .with_reference(customer.field("id"), ReferenceDirection::From),
                    Field::new("ccn").with_categories(&["user.financial.credit_card_number"]),
                ],
            ),
            Collection::new(
                "storage_unit",
                vec![
                    Field::new("box_id").with_primary_key(),
                    Field::new("email")
                        .with_identity("email")
                        .with_categories(&["user.contact.email"]),
                ],
            ),
        ],
    )
}

pub fn postgres_graph() -> Arc<DatasetGraph> {
    Arc::new(DatasetGraph::new(vec![postgres_dataset()]).unwrap())
}

pub fn graph_with_manual() -> Arc<DatasetGraph> {
    Arc::new(DatasetGraph::new(vec![postgres_dataset(), manual_dataset()]).unwrap())
}

/// A mock database pre-loaded with customer 1's data plus rows that belong
/// to somebody else and must never surface.
pub fn seeded_mock() -> Arc<MockConnector> {
    let mock = MockConnector::new();
    mock.set_table(
        &addr("postgres_example", "customer"),
        vec![
            row(&[
                ("id", json!(1)),
                ("email", json!("customer-1@example.com")),
                ("name", json!("John Customer")),
                ("address_id", json!(10)),
            ]),
            row(&[
                ("id", json!(2)),
                ("email", json!("someone-else@example.com")),
                ("name", json!("Jane Other")),
                ("address_id", json!(12)),
            ]),
        ],
    );
    mock.set_table(
        &addr("postgres_example", "orders"),
        vec![
            row(&[
                ("id", json!(100)),
                ("customer_id", json!(1)),
                ("shipping_address_id", json!(10)),
            ]),
            row(&[
                ("id", json!(101)),
                ("customer_id", json!(1)),
                ("shipping_address_id", json!(11)),
            ]),
            row(&[
                ("id", json!(102)),
                ("customer_id", json!(2)),
                ("shipping_address_id", json!(12)),
            ]),
        ],
    );
    mock.set_table(
        &addr("postgres_example", "address"),
        vec![
            row(&[
                ("id", json!(10)),
                ("street", json!("123 Main St")),
                ("city", json!("Springfield")),
            ]),
            row(&[
                ("id", json!(11)),
                ("street", json!("44 Depot Rd")),
                ("city", json!("Shelbyville")),
            ]),
            row(&[
                ("id", json!(12)),
                ("street", json!("9 Elsewhere Ave")),
                ("city", json!("Ogdenville")),
            ]),
        ],
    );
    mock.set_table(
        &addr("postgres_example", "payment_card"),
        vec![
            row(&[
                ("id", json!("pay_aaa")),
                ("customer_id", json!(1)),
                ("ccn", json!(123456789)),
            ]),
            row(&[
                ("id", json!("pay_bbb")),
                ("customer_id", json!(2)),
                ("ccn", json!(987654321)),
            ]),
        ],
    );
    Arc::new(mock)
}

pub fn connectors(mock: Arc<MockConnector>) -> Arc<ConnectorMap> {
    let mut map = ConnectorMap::new();
    map.insert("postgres_db".to_string(), mock);
    let manual: Arc<dyn dsr_connectors::Connector> = Arc::new(ManualConnector::new());
    map.insert("manual_connection".to_string(), manual);
    Arc::new(map)
}

pub fn seeds() -> IdentityMap {
    let mut seeds = IdentityMap::new();
    seeds.insert("email".to_string(), json!("customer-1@example.com"));
    seeds
}

/// Erasure policy nulling contact and financial data.
pub fn erasure_policy() -> Policy {
    Policy {
        key: "default_erasure_policy".to_string(),
        rules: vec![Rule {
            name: "null out user data".to_string(),
            action_type: ActionType::Erasure,
            masking_strategy: MaskingStrategy::NullRewrite,
            targets: vec![Target::new("user.contact"), Target::new("user.financial")],
        }],
    }
}

/// Config with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry: RetryConfig::new(3, 1, 5),
        ..EngineConfig::default()
    }
}
