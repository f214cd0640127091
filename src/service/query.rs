//! QueryService: fan-out operations, whole-bucket reads, ranged
//! reads, and predicate-guarded scans, spread across every cluster in the
//! ensemble and merged back into one result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ErrorCode, ErrorMessage, ServiceResult};
use crate::predicate::Predicate;
use crate::protocol::{Command, CommandReply};
use crate::range::Range;
use crate::registry::{Comparator, ComparatorRegistry, ConditionRegistry, LexicographicComparator};
use crate::router::Router;
use crate::service::{fan_out_required, fan_out_tolerant};
use crate::utils::parallel_merge;
use crate::value::Value;

pub struct QueryService {
    router: Arc<Router>,
    conditions: Arc<ConditionRegistry>,
    comparators: Arc<ComparatorRegistry>,
}

impl QueryService {
    pub fn new(router: Arc<Router>, conditions: Arc<ConditionRegistry>, comparators: Arc<ComparatorRegistry>) -> Self {
        Self { router, conditions, comparators }
    }

    fn comparator_or_default(&self, name: &str) -> Arc<dyn Comparator> {
        if name.is_empty() {
            Arc::new(LexicographicComparator)
        } else {
            self.comparators.get(name).unwrap_or_else(|| Arc::new(LexicographicComparator))
        }
    }

    /// Single-key read: a single-node send.
    pub async fn get_value(&self, bucket: &str, key: Vec<u8>, predicate: &str) -> ServiceResult<Option<Value>> {
        let predicate = Predicate::parse(predicate)?;
        let command = Command::GetValue { bucket: bucket.to_string(), key, predicate };
        let node = command.execute_on_router(&self.router)?;
        match node.send(command).await? {
            CommandReply::Value(v) => Ok(v),
            _ => Err(ErrorMessage::new(ErrorCode::Internal, "unexpected reply to GetValue").into()),
        }
    }

    /// For each cluster, send `GetBuckets` to the first reachable node (a
    /// per-cluster try-next-on-failure), run all clusters in parallel,
    /// union the returned bucket names.
    pub async fn get_buckets(&self) -> ServiceResult<Vec<String>> {
        let snapshot = self.router.broadcast_route();
        let replies = fan_out_tolerant(snapshot, Command::GetBuckets).await;

        let mut names = HashSet::new();
        for reply in replies {
            if let CommandReply::Buckets(list) = reply {
                names.extend(list);
            }
        }
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        Ok(names)
    }

    /// `getAllValues(b, limit)`: broadcast `GetKeys`, union, apply
    /// `limit`, group by owning node, fan out `GetValues`, union the
    /// partial maps.
    pub async fn get_all_values(&self, bucket: &str, limit: usize) -> ServiceResult<HashMap<Vec<u8>, Value>> {
        let snapshot = self.router.broadcast_route();
        let replies = fan_out_tolerant(snapshot, Command::GetKeys { bucket: bucket.to_string() }).await;

        let mut keys: HashSet<Vec<u8>> = HashSet::new();
        for reply in replies {
            if let CommandReply::Keys(k) = reply {
                keys.extend(k);
            }
        }
        let mut keys: Vec<Vec<u8>> = keys.into_iter().collect();
        if limit > 0 {
            keys.truncate(limit);
        }

        self.fetch_values(bucket, keys, None).await
    }

    /// `queryByRange(b, range, predicate, timeToLive)`.
    pub async fn query_by_range(
        &self,
        bucket: &str,
        range: Range,
        predicate: &str,
        ttl: Duration,
    ) -> ServiceResult<Vec<(Vec<u8>, Value)>> {
        let comparator = self.comparator_or_default(&range.comparator_name);
        let predicate = Predicate::parse(predicate)?;
        if let Some(p) = &predicate {
            self.conditions.resolve(&p.condition_type)?;
        }

        let snapshot = self.router.broadcast_route();
        let command = Command::RangeQuery {
            bucket: bucket.to_string(),
            range: range.clone(),
            ttl_ms: ttl.as_millis() as u64,
        };
        let replies = fan_out_required(snapshot, command).await?;

        let sets: Vec<Vec<Vec<u8>>> = replies
            .into_iter()
            .filter_map(|r| match r {
                CommandReply::Keys(k) => Some(k),
                _ => None,
            })
            .collect();
        let mut merged = parallel_merge(sets, comparator).await;
        if !range.is_unlimited() {
            merged.truncate(range.limit);
        }

        let mut values = self.fetch_values(bucket, merged.clone(), predicate).await?;
        let ordered = merged
            .into_iter()
            .filter_map(|k| values.remove(&k).map(|v| (k, v)))
            .collect();
        Ok(ordered)
    }

    /// `queryByPredicate(b, predicate)`: equivalent to
    /// `getAllValues` but with condition-guarded `GetValues`; unordered.
    pub async fn query_by_predicate(&self, bucket: &str, predicate: &str) -> ServiceResult<HashMap<Vec<u8>, Value>> {
        let predicate = Predicate::parse(predicate)?
            .ok_or_else(|| ErrorMessage::new(ErrorCode::BadRequest, "queryByPredicate requires a non-empty predicate"))?;
        self.conditions.resolve(&predicate.condition_type)?;

        let snapshot = self.router.broadcast_route();
        let replies = fan_out_tolerant(snapshot, Command::GetKeys { bucket: bucket.to_string() }).await;
        let mut keys: HashSet<Vec<u8>> = HashSet::new();
        for reply in replies {
            if let CommandReply::Keys(k) = reply {
                keys.extend(k);
            }
        }
        let keys: Vec<Vec<u8>> = keys.into_iter().collect();

        self.fetch_values(bucket, keys, Some(predicate)).await
    }

    /// Group `keys` by owning node (`Router::route_to_nodes_for`) and fan
    /// out `GetValues` in parallel, unioning the partial maps. Shared by
    /// `getAllValues`, `queryByRange`, and `queryByPredicate`.
    async fn fetch_values(
        &self,
        bucket: &str,
        keys: Vec<Vec<u8>>,
        predicate: Option<Predicate>,
    ) -> ServiceResult<HashMap<Vec<u8>, Value>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let groups = self.router.route_to_nodes_for(bucket.as_bytes(), &keys)?;
        let groups: Vec<_> = groups.into_values().collect();
        let bucket = bucket.to_string();

        let replies = crate::utils::parallel_map(groups, move |(node, keys)| {
            let bucket = bucket.clone();
            let predicate = predicate.clone();
            async move { node.send(Command::GetValues { bucket, keys, predicate }).await }
        })
        .await;

        let mut out = HashMap::new();
        for reply in replies {
            if let Ok(CommandReply::Values(values)) = reply {
                out.extend(values);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::LocalNode;
    use crate::cluster::ClusterId;
    use crate::registry::builtin_registries;
    use crate::service::UpdateService;
    use crate::store::MemoryStore;
    use std::time::Duration as StdDuration;

    fn services() -> (UpdateService, QueryService) {
        let (functions, conditions, comparators) = builtin_registries();
        let functions = Arc::new(functions);
        let conditions = Arc::new(conditions);
        let comparators = Arc::new(comparators);
        let router = Arc::new(Router::new(ClusterId::new("local"), []));
        let local_node: Arc<dyn crate::cluster::node::Node> = Arc::new(LocalNode::new(
            "local",
            Arc::new(MemoryStore::new()),
            functions.clone(),
            conditions.clone(),
            comparators.clone(),
            StdDuration::from_secs(1),
            StdDuration::ZERO,
            4,
        ));
        router.set_local_node(local_node.clone());
        router.add_route_to(&ClusterId::new("local"), local_node);

        let update = UpdateService::new(router.clone(), functions);
        let query = QueryService::new(router, conditions, comparators);
        (update, query)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_services() {
        let (update, query) = services();
        update
            .put_value("b", b"k1".to_vec(), Value::from_json(serde_json::json!({"v": 1})).unwrap(), "")
            .await
            .unwrap();

        let got = query.get_value("b", b"k1".to_vec(), "").await.unwrap();
        assert_eq!(got.unwrap().as_json(), &serde_json::json!({"v": 1}));
    }

    #[tokio::test]
    async fn range_query_returns_ordered_subset() {
        let (update, query) = services();
        for k in ["a", "b", "c", "d"] {
            update
                .put_value("b", k.as_bytes().to_vec(), Value::from_json(serde_json::json!({})).unwrap(), "")
                .await
                .unwrap();
        }

        let range = Range::new(b"a".to_vec(), b"c".to_vec(), 0, "order");
        let result = query.query_by_range("b", range, "", StdDuration::ZERO).await.unwrap();
        let ordered_keys: Vec<Vec<u8>> = result.into_iter().map(|(k, _)| k).collect();
        assert_eq!(ordered_keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn get_all_values_unions_keys_across_the_ensemble() {
        let (update, query) = services();
        update
            .put_value("b", b"k1".to_vec(), Value::from_json(serde_json::json!({"v": 1})).unwrap(), "")
            .await
            .unwrap();
        update
            .put_value("b", b"k2".to_vec(), Value::from_json(serde_json::json!({"v": 2})).unwrap(), "")
            .await
            .unwrap();

        let values = query.get_all_values("b", 0).await.unwrap();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn query_by_predicate_requires_nonempty_predicate() {
        let (_update, query) = services();
        let result = query.query_by_predicate("b", "").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_buckets_lists_created_buckets() {
        let (update, query) = services();
        update.add_bucket("b1").await.unwrap();
        update.add_bucket("b2").await.unwrap();
        let buckets = query.get_buckets().await.unwrap();
        assert_eq!(buckets, vec!["b1".to_string(), "b2".to_string()]);
    }
}
