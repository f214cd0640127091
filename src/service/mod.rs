//! Service layer: the only layer an external caller talks to.
//! Translates user operations into Commands, hands them to the
//! [`crate::router::Router`], fans out and merges results, and maps
//! routing/transport/store failures onto [`crate::error::ServiceError`].

pub mod query;
pub mod update;

pub use query::QueryService;
pub use update::UpdateService;

use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::node::Node;
use crate::cluster::ClusterId;
use crate::error::ProcessingError;
use crate::protocol::{Command, CommandReply};
use crate::utils::parallel_map;

/// Try each node of a cluster in order until one replies. Returns the last error if every candidate failed, including
/// the case where `nodes` is empty.
pub(crate) async fn try_first_reachable(
    nodes: &[Arc<dyn Node>],
    command: Command,
) -> Result<CommandReply, ProcessingError> {
    let mut last_err = ProcessingError::Disconnected;
    for node in nodes {
        match node.send(command.clone()).await {
            Ok(reply) => return Ok(reply),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Per-cluster fan-out where an empty/failed cluster contributes nothing
/// rather than failing the whole operation: the policy reserved for
/// `GetBuckets`/`GetKeys`-style commands.
pub(crate) async fn fan_out_tolerant(
    snapshot: HashMap<ClusterId, Vec<Arc<dyn Node>>>,
    command: Command,
) -> Vec<CommandReply> {
    let clusters: Vec<(ClusterId, Vec<Arc<dyn Node>>)> = snapshot.into_iter().collect();
    let results = parallel_map(clusters, move |(_, nodes)| {
        let command = command.clone();
        async move { try_first_reachable(&nodes, command).await.ok() }
    })
    .await;
    results.into_iter().flatten().collect()
}

/// Per-cluster fan-out where any cluster failing entirely fails the whole
/// operation with `INTERNAL`, carrying the last error: the policy
/// used by `RangeQuery`.
pub(crate) async fn fan_out_required(
    snapshot: HashMap<ClusterId, Vec<Arc<dyn Node>>>,
    command: Command,
) -> Result<Vec<CommandReply>, crate::error::ErrorMessage> {
    let clusters: Vec<(ClusterId, Vec<Arc<dyn Node>>)> = snapshot.into_iter().collect();
    let results = parallel_map(clusters, move |(cluster, nodes)| {
        let command = command.clone();
        async move { try_first_reachable(&nodes, command).await.map_err(|e| (cluster, e)) }
    })
    .await;

    let mut replies = Vec::with_capacity(results.len());
    let mut last_failure = None;
    for result in results {
        match result {
            Ok(reply) => replies.push(reply),
            Err(failure) => last_failure = Some(failure),
        }
    }
    if let Some((cluster, e)) = last_failure {
        return Err(crate::error::ErrorMessage::new(
            crate::error::ErrorCode::Internal,
            format!("cluster {cluster} contributed no result: {e}"),
        ));
    }
    Ok(replies)
}
