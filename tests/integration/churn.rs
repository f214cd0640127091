//! Exercises membership churn against a running query: the fan-out
//! layer must tolerate a node that drops out of a cluster's candidate
//! list and still return a correct result from whichever nodes remain.

use std::sync::Arc;
use std::time::Duration;

use ensemblestore::cluster::node::{LocalNode, Node, RemoteNode};
use ensemblestore::cluster::ClusterId;
use ensemblestore::registry::builtin_registries;
use ensemblestore::router::Router;
use ensemblestore::service::{QueryService, UpdateService};
use ensemblestore::store::MemoryStore;
use ensemblestore::value::Value;

fn local_node(name: &str) -> Arc<dyn Node> {
    let (functions, conditions, comparators) = builtin_registries();
    Arc::new(LocalNode::new(
        name.to_string(),
        Arc::new(MemoryStore::new()),
        Arc::new(functions),
        Arc::new(conditions),
        Arc::new(comparators),
        Duration::from_secs(1),
        Duration::ZERO,
        4,
    ))
}

/// A node added to a cluster's candidate list but never connected: every
/// send fails immediately, standing in for a peer that is mid-departure
/// at the moment a query reaches it.
fn unreachable_node(name: &str) -> Arc<dyn Node> {
    Arc::new(RemoteNode::new(name, "127.0.0.1", 1))
}

#[tokio::test]
async fn get_buckets_fails_over_past_a_dead_candidate() {
    let local = ClusterId::new("local");
    let router = Arc::new(Router::new(local.clone(), []));
    let alive = local_node("n2");
    router.set_local_node(alive.clone());
    router.add_route_to(&local, unreachable_node("n1"));
    router.add_route_to(&local, alive);

    let (functions, conditions, comparators) = builtin_registries();
    let update = UpdateService::new(router.clone(), Arc::new(functions));
    update.add_bucket("b1").await.unwrap();
    update.add_bucket("b2").await.unwrap();

    let query = QueryService::new(router, Arc::new(conditions), Arc::new(comparators));
    let buckets = query.get_buckets().await.unwrap();
    assert_eq!(buckets, vec!["b1".to_string(), "b2".to_string()]);
}

#[tokio::test]
async fn get_all_values_reflects_membership_after_a_node_leaves() {
    let local = ClusterId::new("local");
    let router = Arc::new(Router::new(local.clone(), []));
    let survivor = local_node("n1");
    router.set_local_node(survivor.clone());
    router.add_route_to(&local, survivor);

    let (functions, conditions, comparators) = builtin_registries();
    let update = UpdateService::new(router.clone(), Arc::new(functions));
    let query = QueryService::new(router.clone(), Arc::new(conditions), Arc::new(comparators));

    update.add_bucket("b").await.unwrap();
    for k in ["k1", "k2", "k3"] {
        update
            .put_value("b", k.as_bytes().to_vec(), Value::from_json(serde_json::json!({"k": k})).unwrap(), "")
            .await
            .unwrap();
    }

    // n2 joins the cluster's candidate list, then leaves before the
    // query below runs; get_all_values must see only the survivor.
    router.add_route_to(&local, unreachable_node("n2"));
    router.remove_route_to(&local, "n2");
    assert!(router.nodes_in(&local).iter().all(|n| n.name() != "n2"));

    let values = query.get_all_values("b", 0).await.unwrap();
    assert_eq!(values.len(), 3);
    for k in ["k1", "k2", "k3"] {
        assert!(values.contains_key(k.as_bytes()));
    }
}
