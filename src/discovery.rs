//! Discovery / EnsembleManager: periodically probes each remote
//! cluster's membership and keeps the Router's per-cluster node list in
//! sync with the latest reported View.
//!
//! The local cluster is never discovered: its membership is driven
//! directly by the clustered runtime's callback via
//! [`crate::cluster::node::LocalNode::set_local_view`] and
//! [`crate::router::Router::set_local_node`]/`add_route_to`, outside this
//! module.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cluster::node::{remote_node_factory, Node};
use crate::cluster::{ClusterId, Member, View};
use crate::protocol::{Command, CommandReply};
use crate::router::Router;

/// Per-cluster discovery bookkeeping: `{ bootstrapNode, currentNodes
/// (ordered), currentView }`.
struct ClusterDiscoveryState {
    bootstrap: Member,
    current_nodes: AsyncMutex<Vec<Arc<dyn Node>>>,
    current_view: AsyncMutex<View>,
}

/// Drives membership probing for every joined remote cluster on a single
/// shared timer.
pub struct EnsembleManager {
    router: Arc<Router>,
    states: DashMap<ClusterId, Arc<ClusterDiscoveryState>, ahash::RandomState>,
    discovery_interval: Duration,
    timer: SyncMutex<Option<JoinHandle<()>>>,
}

impl EnsembleManager {
    pub fn new(router: Arc<Router>, discovery_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            router,
            states: DashMap::default(),
            discovery_interval,
            timer: SyncMutex::new(None),
        })
    }

    /// `join(cluster, seed, config)`: register the bootstrap node for a
    /// remote cluster and activate the shared timer if this is the first
    /// cluster joined.
    pub fn join(self: &Arc<Self>, cluster: ClusterId, seed: Member) {
        self.states.insert(
            cluster,
            Arc::new(ClusterDiscoveryState {
                bootstrap: seed,
                current_nodes: AsyncMutex::new(Vec::new()),
                current_view: AsyncMutex::new(View::empty()),
            }),
        );
        self.ensure_timer_started();
    }

    fn ensure_timer_started(self: &Arc<Self>) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let manager = self.clone();
        let interval = self.discovery_interval;
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.tick().await;
            }
        }));
    }

    /// Run one probe round against every joined cluster, in parallel.
    pub async fn tick(self: &Arc<Self>) {
        let clusters: Vec<ClusterId> = self.states.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<_> = clusters
            .into_iter()
            .map(|cluster| {
                let manager = self.clone();
                tokio::spawn(async move { manager.update(&cluster).await })
            })
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// `update(cluster)`.
    async fn update(&self, cluster: &ClusterId) {
        let Some(state) = self.states.get(cluster).map(|e| e.clone()) else {
            return;
        };

        let mut current_nodes = state.current_nodes.lock().await;

        if current_nodes.is_empty() {
            let bootstrap = remote_node_factory(&state.bootstrap);
            if let Err(e) = bootstrap.connect().await {
                warn!(cluster = %cluster, error = %e, "bootstrap node unreachable, retrying next tick");
                return;
            }
            let reply = bootstrap.send(Command::Membership).await;
            bootstrap.disconnect().await;

            let updated_view = match reply {
                Ok(CommandReply::View(view)) => view,
                Ok(_) => {
                    warn!(cluster = %cluster, "bootstrap replied to Membership with an unexpected payload");
                    return;
                }
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "bootstrap membership probe failed, retrying next tick");
                    return;
                }
            };
            self.apply_view(cluster, &state, updated_view, &mut current_nodes).await;
            return;
        }

        let mut updated_view = None;
        let mut dead = Vec::new();
        for node in current_nodes.iter() {
            match node.send(Command::Membership).await {
                Ok(CommandReply::View(view)) => {
                    updated_view = Some(view);
                    break;
                }
                Ok(_) => {
                    warn!(cluster = %cluster, node = node.name(), "unexpected reply to Membership probe");
                    dead.push(node.name().to_string());
                }
                Err(e) => {
                    warn!(cluster = %cluster, node = node.name(), error = %e, "membership probe failed, trying next candidate");
                    dead.push(node.name().to_string());
                }
            }
        }

        for name in &dead {
            self.router.remove_route_to(cluster, name);
            if let Some(pos) = current_nodes.iter().position(|n| n.name() == name) {
                let node = current_nodes.remove(pos);
                node.disconnect().await;
            }
        }

        let Some(updated_view) = updated_view else {
            // Every candidate failed: `currentNodes` is now empty, which
            // triggers a bootstrap next tick. The last known `currentView`
            // is preserved rather than cleared, so a
            // later successful probe still diffs against it instead of
            // treating every member as a fresh joiner.
            warn!(cluster = %cluster, "no reachable candidate left, will bootstrap next tick");
            return;
        };

        self.apply_view(cluster, &state, updated_view, &mut current_nodes).await;
    }

    async fn apply_view(
        &self,
        cluster: &ClusterId,
        state: &ClusterDiscoveryState,
        updated_view: View,
        current_nodes: &mut Vec<Arc<dyn Node>>,
    ) {
        let mut current_view = state.current_view.lock().await;

        let leavers: Vec<Member> = updated_view.left_since(&current_view).cloned().collect();
        let joiners: Vec<Member> = updated_view.joined_since(&current_view).cloned().collect();

        for member in &leavers {
            info!(cluster = %cluster, node = %member.name, "member left, evicting route");
            self.router.remove_route_to(cluster, &member.name);
            if let Some(pos) = current_nodes.iter().position(|n| n.name() == member.name) {
                let node = current_nodes.remove(pos);
                node.disconnect().await;
            }
        }

        for member in &joiners {
            info!(cluster = %cluster, node = %member.name, "member joined, adding route");
            let node = remote_node_factory(member);
            self.router.add_route_to(cluster, node.clone());
            if let Err(e) = node.connect().await {
                warn!(cluster = %cluster, node = %member.name, error = %e, "failed to connect newly joined node");
            }
            current_nodes.push(node);
        }

        *current_view = updated_view;
    }

    /// Cancel the shared timer and disconnect every node in every cluster
    /// the Router knows about.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        for cluster in self.router.cluster_ids() {
            for node in self.router.nodes_in(&cluster) {
                node.disconnect().await;
            }
        }
    }
}
