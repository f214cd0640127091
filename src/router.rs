//! Router: composes the EnsemblePartitioner (C3) with each
//! cluster's ClusterPartitioner (C2), and owns the live per-cluster node
//! lists discovery and local-cluster membership callbacks mutate.
//!
//! Each cluster's node list and ring live behind their own lock so
//! `add_route_to`/`remove_route_to` on one cluster never blocks routing
//! against another, and so a routing read never blocks on an unrelated
//! cluster's membership write.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cluster::node::Node;
use crate::cluster::ring::ClusterPartitioner;
use crate::cluster::ClusterId;
use crate::ensemble;
use crate::error::RoutingError;

struct ClusterState {
    nodes: Mutex<Vec<Arc<dyn Node>>>,
    ring: ClusterPartitioner,
}

impl ClusterState {
    fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
            ring: ClusterPartitioner::new(),
        }
    }

    fn rebuild_ring(&self) {
        let nodes = self.nodes.lock().clone();
        self.ring.setup(&nodes);
    }
}

/// The composed routing table for an ensemble of clusters.
pub struct Router {
    clusters: DashMap<ClusterId, Arc<ClusterState>, ahash::RandomState>,
    local_cluster: ClusterId,
    local_node: RwLock<Option<Arc<dyn Node>>>,
}

impl Router {
    /// `setupClusters(clusters)`: initialize the ensemble's cluster set.
    /// `local_cluster` must be one of `clusters` (or is added if absent).
    pub fn new(local_cluster: ClusterId, clusters: impl IntoIterator<Item = ClusterId>) -> Self {
        let table = DashMap::default();
        table.insert(local_cluster.clone(), Arc::new(ClusterState::new()));
        for cluster in clusters {
            table.entry(cluster).or_insert_with(|| Arc::new(ClusterState::new()));
        }
        Self {
            clusters: table,
            local_cluster,
            local_node: RwLock::new(None),
        }
    }

    pub fn local_cluster(&self) -> &ClusterId {
        &self.local_cluster
    }

    /// Every cluster id currently known to this router, local and remote.
    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.clusters.iter().map(|e| e.key().clone()).collect()
    }

    /// Designate the node that `route_to_local_node` returns. Distinct from
    /// `add_route_to(local_cluster, ...)`, which only affects the hash
    /// ring: the local node is always reachable directly, ring or no ring.
    pub fn set_local_node(&self, node: Arc<dyn Node>) {
        *self.local_node.write() = Some(node);
    }

    pub fn route_to_local_node(&self) -> Result<Arc<dyn Node>, RoutingError> {
        self.local_node.read().clone().ok_or_else(|| RoutingError::MissingRoute {
            cluster: self.local_cluster.to_string(),
        })
    }

    fn state_for(&self, cluster: &ClusterId) -> Option<Arc<ClusterState>> {
        self.clusters.get(cluster).map(|e| e.clone())
    }

    /// `addRouteTo(cluster, node)`: add (or replace, by name) a node in a
    /// cluster's live set and rebuild that cluster's ring. Safe to call
    /// concurrently with routing: readers see either the old or the new
    /// ring, never a half-built one.
    pub fn add_route_to(&self, cluster: &ClusterId, node: Arc<dyn Node>) {
        let state = self
            .clusters
            .entry(cluster.clone())
            .or_insert_with(|| Arc::new(ClusterState::new()))
            .clone();
        {
            let mut nodes = state.nodes.lock();
            nodes.retain(|n| n.name() != node.name());
            info!(cluster = %cluster, node = node.name(), "adding route");
            nodes.push(node);
        }
        state.rebuild_ring();
    }

    /// `removeRouteTo(cluster, node)`: evict a node by name and rebuild the
    /// ring (I4: a failed node must be gone before the next dispatch).
    pub fn remove_route_to(&self, cluster: &ClusterId, node_name: &str) {
        let Some(state) = self.state_for(cluster) else {
            return;
        };
        {
            let mut nodes = state.nodes.lock();
            let before = nodes.len();
            nodes.retain(|n| n.name() != node_name);
            if nodes.len() != before {
                warn!(cluster = %cluster, node = node_name, "removing route");
            }
        }
        state.rebuild_ring();
    }

    pub fn nodes_in(&self, cluster: &ClusterId) -> Vec<Arc<dyn Node>> {
        self.state_for(cluster).map(|s| s.nodes.lock().clone()).unwrap_or_default()
    }

    /// `routeToNodeFor(bucket, key)`: C3 picks the owning cluster, C2 picks
    /// the node within it.
    pub fn route_to_node_for(&self, bucket: &[u8], key: &[u8]) -> Result<Arc<dyn Node>, RoutingError> {
        let cluster_ids = self.cluster_ids();
        let owner = ensemble::cluster_for(&cluster_ids, bucket).ok_or(RoutingError::MissingRoute {
            cluster: "<no clusters in ensemble>".to_string(),
        })?;
        let state = self.state_for(owner).ok_or_else(|| RoutingError::MissingRoute {
            cluster: owner.to_string(),
        })?;
        state.ring.node_for(bucket, key).ok_or_else(|| {
            debug!(cluster = %owner, "no reachable node for bucket");
            RoutingError::MissingRoute { cluster: owner.to_string() }
        })
    }

    /// `routeToNodesFor(bucket, keys)`: group keys by destination node,
    /// for multi-key fan-out within the bucket's owning cluster.
    pub fn route_to_nodes_for(
        &self,
        bucket: &[u8],
        keys: &[Vec<u8>],
    ) -> Result<HashMap<String, (Arc<dyn Node>, Vec<Vec<u8>>)>, RoutingError> {
        let cluster_ids = self.cluster_ids();
        let owner = ensemble::cluster_for(&cluster_ids, bucket).ok_or(RoutingError::MissingRoute {
            cluster: "<no clusters in ensemble>".to_string(),
        })?;
        let state = self.state_for(owner).ok_or_else(|| RoutingError::MissingRoute {
            cluster: owner.to_string(),
        })?;

        let mut groups: HashMap<String, (Arc<dyn Node>, Vec<Vec<u8>>)> = HashMap::new();
        for key in keys {
            let node = state.ring.node_for(bucket, key).ok_or_else(|| RoutingError::MissingRoute {
                cluster: owner.to_string(),
            })?;
            groups
                .entry(node.name().to_string())
                .or_insert_with(|| (node.clone(), Vec::new()))
                .1
                .push(key.clone());
        }
        Ok(groups)
    }

    /// `broadcastRoute()`: a snapshot of all live nodes per cluster, for
    /// whole-bucket operations.
    pub fn broadcast_route(&self) -> HashMap<ClusterId, Vec<Arc<dyn Node>>> {
        self.clusters
            .iter()
            .map(|e| (e.key().clone(), e.value().nodes.lock().clone()))
            .collect()
    }
}
