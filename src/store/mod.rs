//! The store boundary: the narrow interface `Command::execute_on_store`
//! invokes once a command reaches its terminal node.
//!
//! `Store`/`Bucket` are traits, not a storage engine: the on-disk/in-memory
//! bucket engine itself is an external collaborator, out of scope for this
//! crate. `memory::MemoryStore` is the one in-process reference
//! implementation shipped here, so the distributed plane can be exercised
//! end-to-end in tests without a real engine attached.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreOperationError;
use crate::protocol::Update;
use crate::range::Range;
use crate::registry::{Comparator, Condition, Function};
use crate::value::Value;

pub use memory::MemoryStore;

/// A guard to check before a conditional put or a guarded get: the named
/// `Condition` plus the predicate's expression.
#[derive(Clone)]
pub struct Guard {
    pub condition: Arc<dyn Condition>,
    pub expression: String,
}

/// Bucket-level storage: an ordered (Key → Value) map local to one node.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Unconditional insert/overwrite.
    async fn put(&self, key: Vec<u8>, value: Value);

    /// Insert if absent; if present, succeed only if `guard` (when given) is
    /// satisfied against the existing value.
    async fn conditional_put(
        &self,
        key: Vec<u8>,
        value: Value,
        guard: Option<Guard>,
    ) -> Result<(), StoreOperationError>;

    async fn get(&self, key: &[u8]) -> Option<Value>;

    /// Read guarded by a predicate: `NotFound` if absent, `Conflict` if the
    /// guard fails to hold against the existing value.
    async fn get_guarded(
        &self,
        key: &[u8],
        guard: Option<&Guard>,
    ) -> Result<Value, StoreOperationError>;

    async fn remove(&self, key: &[u8]) -> Option<Value>;

    /// Read-modify-write under a per-key lock and a deadline. `params` are
    /// forwarded to `function` verbatim; the post-update value is
    /// intentionally not returned: callers re-read.
    async fn update(
        &self,
        key: &[u8],
        function: Arc<dyn Function>,
        params: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<(), StoreOperationError>;

    /// All keys currently held in this bucket on this node.
    async fn keys(&self) -> Vec<Vec<u8>>;

    /// Keys in `[range.start_key, range.end_key]` under `comparator`,
    /// ordered ascending, limited to `range.limit` (0 = unlimited). May be
    /// served from a cached index snapshot no older than `ttl`; `ttl` of
    /// zero forces a fresh compute.
    async fn keys_in_range(
        &self,
        range: &Range,
        comparator: Arc<dyn Comparator>,
        ttl: std::time::Duration,
    ) -> Vec<Vec<u8>>;

    /// Bulk read, optionally predicate-guarded.
    async fn get_values(
        &self,
        keys: &[Vec<u8>],
        guard: Option<&Guard>,
    ) -> std::collections::HashMap<Vec<u8>, Value>;
}

/// Node-local inventory of buckets.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, bucket_name: &str) -> Option<Arc<dyn Bucket>>;
    async fn get_or_create(&self, bucket_name: &str) -> Arc<dyn Bucket>;
    async fn remove(&self, bucket_name: &str);
    async fn bucket_names(&self) -> Vec<String>;
}

/// Everything a [`crate::protocol::Command::execute_on_store`] needs once it
/// has reached its terminal node: the local store plus the operator
/// registries and the default deadline for an `Update` that didn't specify
/// one. Bundled so the caller just passes this in rather than threading
/// each field through separately.
pub struct StoreContext<'a> {
    pub store: &'a dyn Store,
    pub functions: &'a crate::registry::FunctionRegistry,
    pub conditions: &'a crate::registry::ConditionRegistry,
    pub comparators: &'a crate::registry::ComparatorRegistry,
    pub default_update_timeout: std::time::Duration,
    pub range_cache_ttl_floor: std::time::Duration,
}

impl<'a> StoreContext<'a> {
    pub fn comparator_or_default(&self, name: &str) -> Arc<dyn Comparator> {
        if name.is_empty() {
            Arc::new(crate::registry::LexicographicComparator)
        } else {
            self.comparators
                .get(name)
                .unwrap_or_else(|| Arc::new(crate::registry::LexicographicComparator))
        }
    }

    pub fn guard_for(
        &self,
        predicate: &Option<crate::predicate::Predicate>,
    ) -> Result<Option<Guard>, StoreOperationError> {
        match predicate {
            None => Ok(None),
            Some(p) => {
                let condition = self
                    .conditions
                    .resolve(&p.condition_type)
                    .map_err(|e| StoreOperationError::BadRequest(e.message))?;
                Ok(Some(Guard {
                    condition,
                    expression: p.expression.clone(),
                }))
            }
        }
    }
}
