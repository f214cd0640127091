//! The closed set of commands (C6) and their double dispatch.
//!
//! `Command` is a tagged enum, not a trait object: the variant set is
//! closed, so inherent methods read better than a trait with one impl per
//! variant. `execute_on_router` resolves a point command to the
//! single node that owns it; `execute_on_store` runs a command that has
//! already arrived at its terminal node against the local store. Commands
//! whose destination node set the service layer resolves itself
//! are dispatched straight to an already-resolved
//! `Node` rather than through `execute_on_router`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::node::Node;
use crate::cluster::View;
use crate::error::{RoutingError, StoreOperationError};
use crate::predicate::Predicate;
use crate::range::Range;
use crate::router::Router;
use crate::store::StoreContext;
use crate::value::Value;

/// `Update(bucket,key,update{functionName,timeoutMs,params})` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub function_name: String,
    pub timeout_ms: u64,
    pub params: serde_json::Value,
}

impl Update {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    AddBucket {
        bucket: String,
    },
    RemoveBucket {
        bucket: String,
    },
    PutValue {
        bucket: String,
        key: Vec<u8>,
        value: Value,
        predicate: Option<Predicate>,
    },
    RemoveValue {
        bucket: String,
        key: Vec<u8>,
    },
    GetValue {
        bucket: String,
        key: Vec<u8>,
        predicate: Option<Predicate>,
    },
    GetValues {
        bucket: String,
        keys: Vec<Vec<u8>>,
        predicate: Option<Predicate>,
    },
    GetKeys {
        bucket: String,
    },
    GetBuckets,
    RangeQuery {
        bucket: String,
        range: Range,
        ttl_ms: u64,
    },
    Update {
        bucket: String,
        key: Vec<u8>,
        update: Update,
    },
    Membership,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::AddBucket { .. } => "AddBucket",
            Command::RemoveBucket { .. } => "RemoveBucket",
            Command::PutValue { .. } => "PutValue",
            Command::RemoveValue { .. } => "RemoveValue",
            Command::GetValue { .. } => "GetValue",
            Command::GetValues { .. } => "GetValues",
            Command::GetKeys { .. } => "GetKeys",
            Command::GetBuckets => "GetBuckets",
            Command::RangeQuery { .. } => "RangeQuery",
            Command::Update { .. } => "Update",
            Command::Membership => "Membership",
        }
    }

    /// Resolve the single node this command must be sent to. Only the point
    /// commands route this way; fan-out commands are dispatched
    /// by the service layer against nodes it has already resolved via
    /// `Router::broadcast_route`/`route_to_nodes_for`.
    pub fn execute_on_router(&self, router: &Router) -> Result<Arc<dyn Node>, RoutingError> {
        match self {
            Command::AddBucket { .. } | Command::RemoveBucket { .. } => {
                router.route_to_local_node()
            }
            Command::PutValue { bucket, key, .. }
            | Command::RemoveValue { bucket, key }
            | Command::GetValue { bucket, key, .. }
            | Command::Update { bucket, key, .. } => {
                router.route_to_node_for(bucket.as_bytes(), key)
            }
            other => Err(RoutingError::NotRoutable {
                command: other.name(),
            }),
        }
    }

    /// Run this command against the local store, once it has reached its
    /// terminal node.
    pub async fn execute_on_store(
        &self,
        ctx: &StoreContext<'_>,
    ) -> Result<CommandReply, StoreOperationError> {
        match self {
            Command::AddBucket { bucket } => {
                ctx.store.get_or_create(bucket).await;
                Ok(CommandReply::Ack)
            }
            Command::RemoveBucket { bucket } => {
                ctx.store.remove(bucket).await;
                Ok(CommandReply::Ack)
            }
            Command::PutValue {
                bucket,
                key,
                value,
                predicate,
            } => {
                let bucket = ctx.store.get_or_create(bucket).await;
                let guard = ctx.guard_for(predicate)?;
                bucket.conditional_put(key.clone(), value.clone(), guard).await?;
                Ok(CommandReply::Ack)
            }
            Command::RemoveValue { bucket, key } => {
                let bucket = ctx
                    .store
                    .get(bucket)
                    .await
                    .ok_or_else(|| StoreOperationError::BucketNotFound(bucket.clone()))?;
                bucket.remove(key).await;
                Ok(CommandReply::Ack)
            }
            Command::GetValue {
                bucket,
                key,
                predicate,
            } => {
                let bucket_ref = ctx
                    .store
                    .get(bucket)
                    .await
                    .ok_or_else(|| StoreOperationError::BucketNotFound(bucket.clone()))?;
                let guard = ctx.guard_for(predicate)?;
                let value = bucket_ref.get_guarded(key, guard.as_ref()).await?;
                Ok(CommandReply::Value(Some(value)))
            }
            Command::GetValues {
                bucket,
                keys,
                predicate,
            } => {
                let bucket_ref = ctx
                    .store
                    .get(bucket)
                    .await
                    .ok_or_else(|| StoreOperationError::BucketNotFound(bucket.clone()))?;
                let guard = ctx.guard_for(predicate)?;
                let values = bucket_ref.get_values(keys, guard.as_ref()).await;
                Ok(CommandReply::Values(values))
            }
            Command::GetKeys { bucket } => {
                let keys = match ctx.store.get(bucket).await {
                    Some(bucket) => bucket.keys().await,
                    None => Vec::new(),
                };
                Ok(CommandReply::Keys(keys))
            }
            Command::GetBuckets => Ok(CommandReply::Buckets(ctx.store.bucket_names().await)),
            Command::RangeQuery {
                bucket,
                range,
                ttl_ms,
            } => {
                let keys = match ctx.store.get(bucket).await {
                    Some(bucket) => {
                        let comparator = ctx.comparator_or_default(&range.comparator_name);
                        // The node's configured cache floor is a minimum, not
                        // a default: a caller-requested ttl below it is
                        // raised to the floor rather than honored verbatim.
                        let ttl = Duration::from_millis(*ttl_ms).max(ctx.range_cache_ttl_floor);
                        bucket.keys_in_range(range, comparator, ttl).await
                    }
                    None => Vec::new(),
                };
                Ok(CommandReply::Keys(keys))
            }
            Command::Update { bucket, key, update } => {
                let bucket_ref = ctx
                    .store
                    .get(bucket)
                    .await
                    .ok_or_else(|| StoreOperationError::BucketNotFound(bucket.clone()))?;
                let function = ctx
                    .functions
                    .resolve(&update.function_name)
                    .map_err(|e| StoreOperationError::BadRequest(e.message))?;
                let timeout = if update.timeout_ms == 0 {
                    ctx.default_update_timeout
                } else {
                    update.timeout()
                };
                bucket_ref
                    .update(key, function, update.params.clone(), timeout)
                    .await?;
                Ok(CommandReply::Ack)
            }
            Command::Membership => Err(StoreOperationError::Internal(
                "Membership is answered by the local cluster view, not the store".to_string(),
            )),
        }
    }
}

/// The result half of a `Command`/`CommandReply` exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandReply {
    Ack,
    Value(Option<Value>),
    Values(HashMap<Vec<u8>, Value>),
    Keys(Vec<Vec<u8>>),
    Buckets(Vec<String>),
    View(View),
}
