// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::protocol::ServiceHealth;
use crate::NodeState;

fn services(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn online() -> NodeStatus {
    NodeStatus::new(1, NodeState::Online, Some(3), None)
}

fn unreachable() -> NodeStatus {
    NodeStatus::new(
        2,
        NodeState::Unreachable,
        Some(60_000),
        Some("timed out".to_string()),
    )
}

fn registry() -> ClusterRegistry {
    ClusterRegistry::new(vec!["http://master:9099".to_string()], 9099)
}

/// Rebuild what the service indexes should contain from the node list alone,
/// then compare against the published indexes
fn assert_consistent(registry: &ClusterRegistry) {
    let mut expected: BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)> = BTreeMap::new();
    for node in registry.list_nodes().iter() {
        for service in node.services() {
            let (active, inactive) = expected.entry(service.clone()).or_default();
            if node.is_online() {
                active.insert(node.address().to_string());
            } else {
                inactive.insert(node.address().to_string());
            }
        }
    }

    let published: BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)> = registry
        .services
        .load()
        .iter()
        .map(|(name, index)| {
            let snapshot = index.snapshot();
            (
                name.clone(),
                (
                    snapshot.active_addresses().into_iter().collect(),
                    snapshot.inactive_addresses().into_iter().collect(),
                ),
            )
        })
        .collect();
    assert_eq!(expected, published);
}

#[test]
fn test_upsert_normalizes_and_starts_undetermined() {
    let registry = registry();
    let node = registry
        .upsert("Node-1:9090", services(&["search"]))
        .expect("Valid address");
    assert_eq!("http://node-1:9090", node.address());
    assert_eq!(NodeState::Undetermined, node.status().state);

    assert_eq!(
        vec!["http://node-1:9090".to_string()],
        registry.inactive_nodes("search")
    );
    assert!(registry.active_nodes("search").is_empty());
    assert_consistent(&registry);
}

#[test]
fn test_address_without_port_gets_the_default_port() {
    let registry = registry();
    let node = registry
        .upsert("node-1", services(&["search"]))
        .expect("Valid address");
    assert_eq!("http://node-1:9099", node.address());
    assert_eq!(
        vec!["http://node-1:9099".to_string()],
        registry.inactive_nodes("search")
    );

    // same node, whichever way its port is spelled
    let again = registry
        .upsert("http://Node-1:9099", services(&["search"]))
        .expect("Valid address");
    assert!(Arc::ptr_eq(&node, &again));

    // an explicit well-known port is another node
    registry
        .upsert("http://node-1:80", services(&["search"]))
        .expect("Valid address");
    assert_eq!(2, registry.list_nodes().len());

    let removed = registry
        .remove("node-1")
        .expect("Valid address")
        .expect("Node is registered");
    assert!(Arc::ptr_eq(&node, &removed));
    assert_eq!(
        vec!["http://node-1:80".to_string()],
        registry.inactive_nodes("search")
    );
}

#[test]
fn test_upsert_rejects_malformed_address() {
    let registry = registry();
    assert!(matches!(
        registry.upsert("http://", services(&["search"])),
        Err(ClusterErr::MalformedAddress(_))
    ));
    assert!(registry.list_nodes().is_empty());
}

#[test]
fn test_same_services_keeps_record() {
    let registry = registry();
    let first = registry
        .upsert("node-1:9090", services(&["search"]))
        .expect("Valid address");
    assert!(registry.update_status(&first, online()));

    let list_before = registry.list_nodes();
    let second = registry
        .upsert("NODE-1:9090", services(&["search"]))
        .expect("Valid address");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.is_online());
    assert!(Arc::ptr_eq(&list_before, &registry.list_nodes()));
    assert_eq!(1, registry.list_nodes().len());
}

#[test]
fn test_different_services_replaces_record() {
    let registry = registry();
    let first = registry
        .upsert("node-1:9090", services(&["search", "index"]))
        .expect("Valid address");
    registry.update_status(&first, online());

    let second = registry
        .upsert("node-1:9090", services(&["crawl"]))
        .expect("Valid address");
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(NodeState::Undetermined, second.status().state);

    assert!(registry.service("search").is_none());
    assert!(registry.service("index").is_none());
    assert_eq!(
        vec!["http://node-1:9090".to_string()],
        registry.inactive_nodes("crawl")
    );
    assert_eq!(1, registry.list_nodes().len());
    assert_consistent(&registry);
}

#[test]
fn test_remove() {
    let registry = registry();
    registry
        .upsert("node-1:9090", services(&["search"]))
        .expect("Valid address");
    registry
        .upsert("node-2:9090", services(&["search"]))
        .expect("Valid address");

    let removed = registry.remove("node-1:9090").expect("Valid address");
    assert_eq!(
        Some("http://node-1:9090"),
        removed.as_ref().map(|n| n.address())
    );
    assert!(registry
        .list_nodes()
        .iter()
        .all(|n| n.address() != "http://node-1:9090"));
    assert_eq!(
        vec!["http://node-2:9090".to_string()],
        registry.inactive_nodes("search")
    );

    assert!(registry
        .remove("node-1:9090")
        .expect("Valid address")
        .is_none());
    assert!(registry.remove("").is_err());
    assert_consistent(&registry);
}

#[test]
fn test_status_updates_repartition_every_service() {
    let registry = registry();
    let node = registry
        .upsert("node-1:9090", services(&["search", "index"]))
        .expect("Valid address");

    assert!(registry.update_status(&node, online()));
    for service in ["search", "index"] {
        assert_eq!(
            vec!["http://node-1:9090".to_string()],
            registry.active_nodes(service)
        );
        assert!(registry.inactive_nodes(service).is_empty());
    }
    assert_eq!(
        Some("http://node-1:9090".to_string()),
        registry.random_active_node("search")
    );

    assert!(registry.update_status(&node, unreachable()));
    assert!(registry.active_nodes("search").is_empty());
    assert_eq!(None, registry.random_active_node("search"));

    let status = registry.service_status("search");
    assert!(status.active.is_empty());
    let inactive = status
        .inactive
        .get("http://node-1:9090")
        .expect("Node should be inactive");
    assert_eq!(NodeState::Unreachable, inactive.state);
    assert_consistent(&registry);
}

#[test]
fn test_stale_status_update_is_dropped() {
    let registry = registry();
    let old = registry
        .upsert("node-1:9090", services(&["search"]))
        .expect("Valid address");
    let new = registry
        .upsert("node-1:9090", services(&["index"]))
        .expect("Valid address");

    assert!(!registry.update_status(&old, online()));
    assert!(registry.service("search").is_none());
    assert!(registry.active_nodes("index").is_empty());

    registry.remove("node-1:9090").expect("Valid address");
    assert!(!registry.update_status(&new, online()));
    assert!(registry.service("index").is_none());
}

#[test]
fn test_dropped_record_is_retired() {
    let registry = registry();
    let old = registry
        .upsert("node-1:9090", services(&["search"]))
        .expect("Valid address");
    let kept = registry
        .upsert("node-1:9090", services(&["search"]))
        .expect("Valid address");
    assert!(!old.is_retired());
    assert!(Arc::ptr_eq(&old, &kept));

    let new = registry
        .upsert("node-1:9090", services(&["search", "index"]))
        .expect("Valid address");
    assert!(old.is_retired());
    assert!(!new.is_retired());

    // a check completing for the old record after the replacement can't bring it back
    let index = registry.service("search").expect("Service is indexed");
    old.set_status(online());
    assert!(!index.insert(&old));
    assert_eq!(vec!["http://node-1:9090".to_string()], registry.inactive_nodes("search"));
    assert!(Arc::ptr_eq(&new, &index.snapshot().inactive[0]));

    registry.remove("node-1:9090").expect("Valid address");
    assert!(new.is_retired());
    assert_consistent(&registry);
}

#[test]
fn test_concurrent_status_updates_of_one_node() {
    let registry = Arc::new(registry());
    let node = registry
        .upsert("node-1:9090", services(&["search", "index"]))
        .expect("Valid address");

    let updaters: Vec<_> = (0..4)
        .map(|t| {
            let registry = registry.clone();
            let node = node.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let status = if (i + t) % 2 == 0 { online() } else { unreachable() };
                    assert!(registry.update_status(&node, status));
                }
            })
        })
        .collect();
    for updater in updaters {
        updater.join().expect("Updater panicked");
    }
    assert_consistent(&registry);

    registry.update_status(&node, online());
    assert_eq!(vec!["http://node-1:9090".to_string()], registry.active_nodes("index"));
    assert_consistent(&registry);
}

#[test]
fn test_unknown_service_reads() {
    let registry = registry();
    assert!(registry.active_nodes("nonexistent-service").is_empty());
    assert!(registry.inactive_nodes("nonexistent-service").is_empty());
    assert_eq!(None, registry.random_active_node("nonexistent-service"));
    assert_eq!(
        ServiceStatus::default(),
        registry.service_status("nonexistent-service")
    );
}

#[test]
fn test_summary_and_exports() {
    let registry = registry();
    let a = registry
        .upsert("a:1", services(&["search", "index"]))
        .expect("Valid address");
    registry
        .upsert("b:1", services(&["search"]))
        .expect("Valid address");
    registry.upsert("c:1", services(&[])).expect("Valid address");
    registry.update_status(&a, online());

    let summary = registry.services_summary();
    assert_eq!(
        ServiceSummary {
            active: 1,
            inactive: 0,
            status: ServiceHealth::Ok
        },
        summary["index"]
    );
    assert_eq!(
        ServiceSummary {
            active: 1,
            inactive: 1,
            status: ServiceHealth::Degraded
        },
        summary["search"]
    );

    let nodes = registry.nodes_map();
    assert_eq!(3, nodes.len());
    assert!(nodes["http://c:1"].is_empty());

    let status = registry.cluster_status();
    assert!(status.is_master);
    assert_eq!(vec!["http://master:9099".to_string()], status.masters);
    assert_eq!(3, status.nodes.len());
    assert!(status.nodes["http://a:1"].online);
    assert_eq!(
        BTreeSet::from(["http://a:1".to_string(), "http://b:1".to_string()]),
        status.services["search"]
    );
}

#[test]
fn test_random_operations_keep_indexes_consistent() {
    let registry = registry();
    let mut rng = StdRng::seed_from_u64(42);
    let names = ["search", "index", "crawl", "web"];

    for _ in 0..2000 {
        let address = format!("node-{}:9090", rng.gen_range(0..12));
        match rng.gen_range(0..4) {
            0 | 1 => {
                let chosen: BTreeSet<String> = names
                    .iter()
                    .filter(|_| rng.gen_bool(0.5))
                    .map(|s| s.to_string())
                    .collect();
                registry.upsert(&address, chosen).expect("Valid address");
            }
            2 => {
                registry.remove(&address).expect("Valid address");
            }
            _ => {
                let nodes = registry.list_nodes();
                if !nodes.is_empty() {
                    let node = &nodes[rng.gen_range(0..nodes.len())];
                    let status = if rng.gen_bool(0.5) {
                        online()
                    } else {
                        unreachable()
                    };
                    registry.update_status(node, status);
                }
            }
        }
        assert_consistent(&registry);
    }
}

#[test]
fn test_concurrent_mutations_and_reads() {
    let registry = Arc::new(registry());
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let address = format!("node-{}:9090", (i + t) % 10);
                    let node = registry
                        .upsert(&address, services(&["search"]))
                        .expect("Valid address");
                    registry.update_status(&node, if i % 2 == 0 { online() } else { unreachable() });
                    if i % 7 == 0 {
                        registry.remove(&address).expect("Valid address");
                    }
                }
            })
        })
        .collect();
    let reader = {
        let registry = registry.clone();
        std::thread::spawn(move || {
            for _ in 0..2000 {
                let nodes = registry.list_nodes();
                let unique: BTreeSet<_> = nodes.iter().map(|n| n.address().to_string()).collect();
                assert_eq!(unique.len(), nodes.len());
                if let Some(index) = registry.service("search") {
                    let snapshot = index.snapshot();
                    for node in snapshot.active.iter() {
                        assert!(!snapshot
                            .inactive
                            .iter()
                            .any(|other| other.address() == node.address()));
                    }
                }
            }
        })
    };
    for writer in writers {
        writer.join().expect("Writer panicked");
    }
    reader.join().expect("Reader panicked");
    assert_consistent(&registry);
}
