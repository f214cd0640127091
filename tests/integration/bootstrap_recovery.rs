//! Bootstrap-lost-then-regained: the seed node is unreachable on the
//! first discovery tick and reachable on the second, against a real
//! socket rather than a fake transport.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ensemblestore::cluster::{ClusterId, Member, View};
use ensemblestore::discovery::EnsembleManager;
use ensemblestore::listener::Listener;
use ensemblestore::registry::builtin_registries;
use ensemblestore::router::Router;
use ensemblestore::store::MemoryStore;
use parking_lot::RwLock;
use tokio::net::TcpListener;

#[tokio::test]
async fn bootstrap_lost_then_regained_across_two_ticks() {
    let local = ClusterId::new("local");
    let remote = ClusterId::new("remote");
    let router = Arc::new(Router::new(local, [remote.clone()]));
    // An interval far longer than this test's runtime: the manager's own
    // background timer must not race the manual ticks below.
    let manager = EnsembleManager::new(router.clone(), Duration::from_secs(3600));

    // Reserve a port, then release it immediately so the seed points at
    // an address nothing is listening on yet.
    let reservation = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = reservation.local_addr().unwrap().port();
    drop(reservation);

    manager.join(remote.clone(), Member::new("seed", "127.0.0.1", port));

    manager.tick().await;
    assert!(
        router.nodes_in(&remote).is_empty(),
        "bootstrap target is unreachable; no routes should have been added yet"
    );

    // Bring up a real listener on the same port, reporting a view with
    // two members.
    let (functions, conditions, comparators) = builtin_registries();
    let mut members = HashSet::new();
    members.insert(Member::new("n1", "127.0.0.1", port + 1));
    members.insert(Member::new("n2", "127.0.0.1", port + 2));
    let local_view = Arc::new(RwLock::new(View::new(members)));
    let listener = Listener::new(
        Arc::new(MemoryStore::new()),
        Arc::new(functions),
        Arc::new(conditions),
        Arc::new(comparators),
        Duration::from_secs(1),
        Duration::ZERO,
        4,
        local_view,
    );
    tokio::spawn(async move { listener.serve(("127.0.0.1", port)).await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    manager.tick().await;

    let names: HashSet<String> = router.nodes_in(&remote).iter().map(|n| n.name().to_string()).collect();
    assert!(names.contains("n1"));
    assert!(names.contains("n2"));
}
