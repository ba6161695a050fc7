//! Traversal planner: reachability plus deterministic dependency ordering.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::warn;

use dsr_types::IdentityMap;

use crate::config::{CollectionAddress, FieldAddress};
use crate::errors::UnsatisfiableGraphError;
use crate::graph::{DatasetGraph, Edge};

/// A resolved dependency edge into a traversal node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEdge {
    /// Upstream field whose recorded row values feed this node.
    pub source: FieldAddress,
    /// Field on this node's collection the values locate rows by.
    pub local_field: String,
    /// Whether the edge was declared optional.
    pub optional: bool,
}

/// A collection annotated with its resolved predecessors and the seed
/// identities it can start from. Created fresh per pass; never mutated after
/// planning.
#[derive(Debug, Clone)]
pub struct TraversalNode {
    /// Collection this node executes.
    pub address: CollectionAddress,
    /// Kept incoming edges, in deterministic `(source, local_field)` order.
    pub incoming: Vec<IncomingEdge>,
    /// `(seed key, field name)` pairs for identity fields matched by a seed.
    pub identity_fields: Vec<(String, String)>,
}

impl TraversalNode {
    /// Addresses of the upstream collections this node needs output from.
    pub fn predecessors(&self) -> BTreeSet<CollectionAddress> {
        self.incoming
            .iter()
            .map(|e| e.source.collection.clone())
            .collect()
    }
}

/// The planned execution order for one pass.
///
/// Planning is pure and repeatable given the same graph and seeds; callers
/// re-derive the traversal on every resume rather than persisting it.
#[derive(Debug, Clone)]
pub struct Traversal {
    nodes: Vec<TraversalNode>,
    /// Collections not reachable from any seed, excluded from execution.
    pub skipped: Vec<CollectionAddress>,
    /// Optional edges dropped to break cycles (includes self-references).
    pub dropped_edges: Vec<Edge>,
}

impl Traversal {
    /// Plan a traversal of `graph` starting from the given seed identities.
    ///
    /// Produces a total order consistent with mandatory dependency edges,
    /// ties broken by ascending `dataset:collection` name. A cycle closable
    /// only through optional edges is broken by dropping the first optional
    /// edge in `(from, to)` ascending order; a cycle among mandatory edges
    /// fails with [`UnsatisfiableGraphError`].
    pub fn new(
        graph: &DatasetGraph,
        seeds: &IdentityMap,
    ) -> Result<Self, UnsatisfiableGraphError> {
        let roots = identity_roots(graph, seeds);
        let reachable = reachable_from(graph, &roots);

        let skipped: Vec<CollectionAddress> = graph
            .collections()
            .keys()
            .filter(|a| !reachable.contains(*a))
            .cloned()
            .collect();

        // Edges fully inside the reachable set. Self-referencing edges can
        // never be ordered and are dropped up front.
        let mut dropped_edges: Vec<Edge> = Vec::new();
        let mut scoped: Vec<Edge> = Vec::new();
        for edge in graph.edges() {
            if !reachable.contains(&edge.from.collection) || !reachable.contains(&edge.to.collection)
            {
                continue;
            }
            if edge.from.collection == edge.to.collection {
                dropped_edges.push(edge.clone());
            } else {
                scoped.push(edge.clone());
            }
        }
        // Deterministic edge order for in-degree bookkeeping and drop choice.
        scoped.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        let order = order_collections(&reachable, &mut scoped, &mut dropped_edges)?;

        for edge in &dropped_edges {
            warn!(
                from = %edge.from,
                to = %edge.to,
                "dropped optional reference edge to keep the traversal acyclic"
            );
        }

        let nodes = order
            .into_iter()
            .map(|address| {
                let incoming = scoped
                    .iter()
                    .filter(|e| e.to.collection == address)
                    .map(|e| IncomingEdge {
                        source: e.from.clone(),
                        local_field: e.to.field.clone(),
                        optional: e.optional,
                    })
                    .collect();
                let identity_fields = identity_fields_for(graph, &address, seeds);
                TraversalNode {
                    address,
                    incoming,
                    identity_fields,
                }
            })
            .collect();

        Ok(Self {
            nodes,
            skipped,
            dropped_edges,
        })
    }

    /// Nodes in execution order.
    pub fn nodes(&self) -> &[TraversalNode] {
        &self.nodes
    }

    /// Look up the planned node for a collection, if it is part of the pass.
    pub fn node(&self, address: &CollectionAddress) -> Option<&TraversalNode> {
        self.nodes.iter().find(|n| &n.address == address)
    }
}

/// Collections with at least one identity field matched by a seed key.
fn identity_roots(graph: &DatasetGraph, seeds: &IdentityMap) -> BTreeSet<CollectionAddress> {
    graph
        .collections()
        .iter()
        .filter(|(_, collection)| {
            collection
                .fields
                .iter()
                .any(|f| f.identity.as_deref().is_some_and(|k| seeds.contains_key(k)))
        })
        .map(|(address, _)| address.clone())
        .collect()
}

/// `(seed key, field name)` pairs for one collection.
fn identity_fields_for(
    graph: &DatasetGraph,
    address: &CollectionAddress,
    seeds: &IdentityMap,
) -> Vec<(String, String)> {
    graph
        .collection(address)
        .map(|collection| {
            collection
                .fields
                .iter()
                .filter_map(|f| {
                    let key = f.identity.as_deref()?;
                    seeds
                        .contains_key(key)
                        .then(|| (key.to_string(), f.name.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Breadth-first reachability over all edges (optional included).
fn reachable_from(
    graph: &DatasetGraph,
    roots: &BTreeSet<CollectionAddress>,
) -> BTreeSet<CollectionAddress> {
    let mut downstream: BTreeMap<&CollectionAddress, Vec<&CollectionAddress>> = BTreeMap::new();
    for edge in graph.edges() {
        downstream
            .entry(&edge.from.collection)
            .or_default()
            .push(&edge.to.collection);
    }

    let mut reachable: BTreeSet<CollectionAddress> = roots.clone();
    let mut frontier: VecDeque<CollectionAddress> = roots.iter().cloned().collect();
    while let Some(current) = frontier.pop_front() {
        if let Some(nexts) = downstream.get(&current) {
            for next in nexts {
                if reachable.insert((*next).clone()) {
                    frontier.push_back((*next).clone());
                }
            }
        }
    }
    reachable
}

/// Kahn's algorithm with a deterministic ready set and optional-edge cycle
/// breaking. Dropped edges are removed from `scoped` and appended to
/// `dropped`.
fn order_collections(
    reachable: &BTreeSet<CollectionAddress>,
    scoped: &mut Vec<Edge>,
    dropped: &mut Vec<Edge>,
) -> Result<Vec<CollectionAddress>, UnsatisfiableGraphError> {
    let mut in_degree: BTreeMap<&CollectionAddress, usize> =
        reachable.iter().map(|a| (a, 0usize)).collect();
    let mut live: Vec<bool> = vec![true; scoped.len()];
    for edge in scoped.iter() {
        *in_degree.get_mut(&edge.to.collection).expect("reachable") += 1;
    }

    let mut ready: BTreeSet<CollectionAddress> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(a, _)| (*a).clone())
        .collect();
    let mut order: Vec<CollectionAddress> = Vec::with_capacity(reachable.len());
    let mut placed: BTreeSet<CollectionAddress> = BTreeSet::new();

    while order.len() < reachable.len() {
        if let Some(next) = ready.iter().next().cloned() {
            ready.remove(&next);
            placed.insert(next.clone());
            for (i, edge) in scoped.iter().enumerate() {
                if live[i] && edge.from.collection == next {
                    let degree = in_degree.get_mut(&edge.to.collection).expect("reachable");
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(edge.to.collection.clone());
                    }
                }
            }
            order.push(next);
            continue;
        }

        // Stuck: every remaining collection sits on a cycle. Drop the first
        // optional edge (in sorted order) still connecting remaining nodes.
        let candidate = scoped.iter().enumerate().find(|(i, e)| {
            live[*i]
                && e.optional
                && !placed.contains(&e.from.collection)
                && !placed.contains(&e.to.collection)
        });
        match candidate {
            Some((i, _)) => {
                let edge = scoped[i].clone();
                live[i] = false;
                let degree = in_degree.get_mut(&edge.to.collection).expect("reachable");
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(edge.to.collection.clone());
                }
                dropped.push(edge);
            }
            None => {
                let cycle: Vec<CollectionAddress> = reachable
                    .iter()
                    .filter(|a| !placed.contains(*a))
                    .cloned()
                    .collect();
                return Err(UnsatisfiableGraphError { cycle });
            }
        }
    }

    // Physically remove dropped edges so callers never see them as incoming.
    let mut kept = Vec::with_capacity(scoped.len());
    for (i, edge) in scoped.drain(..).enumerate() {
        if live[i] {
            kept.push(edge);
        }
    }
    *scoped = kept;

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Collection, Dataset, Field, ReferenceDirection};
    use serde_json::json;

    fn seeds() -> IdentityMap {
        let mut m = IdentityMap::new();
        m.insert("email".to_string(), json!("x@example.com"));
        m
    }

    fn linear_dataset() -> Dataset {
        let customer_id = CollectionAddress::new("db", "customer").field("id");
        let orders_id = CollectionAddress::new("db", "orders").field("id");
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
                Collection::new(
                    "shipments",
                    vec![
                        Field::new("id").with_primary_key(),
                        Field::new("order_id").with_reference(orders_id, ReferenceDirection::From),
                    ],
                ),
                // No identity and no incoming reference: unreachable.
                Collection::new("audit_archive", vec![Field::new("id")]),
            ],
        )
    }

    #[test]
    fn test_topological_order_and_skipped() {
        let graph = DatasetGraph::new(vec![linear_dataset()]).unwrap();
        let traversal = Traversal::new(&graph, &seeds()).unwrap();

        let order: Vec<String> = traversal
            .nodes()
            .iter()
            .map(|n| n.address.to_string())
            .collect();
        assert_eq!(order, vec!["db:customer", "db:orders", "db:shipments"]);
        assert_eq!(
            traversal.skipped,
            vec![CollectionAddress::new("db", "audit_archive")]
        );
        assert!(traversal.dropped_edges.is_empty());

        // Every node is placed after all of its predecessors.
        for (i, node) in traversal.nodes().iter().enumerate() {
            for pred in node.predecessors() {
                let pred_index = traversal
                    .nodes()
                    .iter()
                    .position(|n| n.address == pred)
                    .expect("predecessor planned");
                assert!(pred_index < i, "{} must precede {}", pred, node.address);
            }
        }
    }

    #[test]
    fn test_planning_is_deterministic() {
        let graph = DatasetGraph::new(vec![linear_dataset()]).unwrap();
        let a = Traversal::new(&graph, &seeds()).unwrap();
        let b = Traversal::new(&graph, &seeds()).unwrap();
        let names = |t: &Traversal| {
            t.nodes()
                .iter()
                .map(|n| n.address.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&a), names(&b));
    }

    #[test]
    fn test_mandatory_cycle_is_unsatisfiable() {
        let a_ref = CollectionAddress::new("db", "a").field("id");
        let b_ref = CollectionAddress::new("db", "b").field("id");
        let dataset = Dataset::new(
            "db",
            "db_connection",
            vec![
                Collection::new(
                    "a",
                    vec![
                        Field::new("id").with_identity("email"),
                        Field::new("b_id").with_reference(b_ref, ReferenceDirection::From),
                    ],
                ),
                Collection::new(
                    "b",
                    vec![
                        Field::new("id"),
                        Field::new("a_id").with_reference(a_ref, ReferenceDirection::From),
                    ],
                ),
            ],
        );
        let graph = DatasetGraph::new(vec![dataset]).unwrap();
        let err = Traversal::new(&graph, &seeds()).unwrap_err();
        assert_eq!(err.cycle.len(), 2);
    }

    #[test]
    fn test_optional_edge_breaks_cycle() {
        let a_ref = CollectionAddress::new("db", "a").field("id");
        let b_ref = CollectionAddress::new("db", "b").field("id");
        let dataset = Dataset::new(
            "db",
            "db_connection",
            vec![
                Collection::new(
                    "a",
                    vec![
                        Field::new("id").with_identity("email"),
                        Field::new("b_id")
                            .with_optional_reference(b_ref, ReferenceDirection::From),
                    ],
                ),
                Collection::new(
                    "b",
                    vec![
                        Field::new("id"),
                        Field::new("a_id").with_reference(a_ref, ReferenceDirection::From),
                    ],
                ),
            ],
        );
        let graph = DatasetGraph::new(vec![dataset]).unwrap();
        let traversal = Traversal::new(&graph, &seeds()).unwrap();

        let order: Vec<String> = traversal
            .nodes()
            .iter()
            .map(|n| n.address.to_string())
            .collect();
        assert_eq!(order, vec!["db:a", "db:b"]);
        assert_eq!(traversal.dropped_edges.len(), 1);
        assert_eq!(traversal.dropped_edges[0].from.to_string(), "db:b:id");
        // The dropped edge no longer appears as an incoming dependency.
        assert!(traversal.nodes()[0].incoming.is_empty());
    }

    #[test]
    fn test_no_seed_match_means_everything_skipped() {
        let graph = DatasetGraph::new(vec![linear_dataset()]).unwrap();
        let mut other_seeds = IdentityMap::new();
        other_seeds.insert("phone_number".to_string(), json!("555-0100"));
        let traversal = Traversal::new(&graph, &other_seeds).unwrap();
        assert!(traversal.nodes().is_empty());
        assert_eq!(traversal.skipped.len(), 4);
    }
}
