//! In-process reference `Store`/`Bucket`: an ordered in-memory map per
//! bucket. Exists so the distributed plane (routing, discovery, services)
//! can be exercised end-to-end without a real storage engine attached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::StoreOperationError;
use crate::range::Range;
use crate::registry::{Comparator, Function};
use crate::store::{Bucket, Guard, Store};
use crate::value::Value;

struct RangeCache {
    taken_at: Instant,
    sorted_keys: Vec<Vec<u8>>,
}

pub struct MemoryBucket {
    data: DashMap<Vec<u8>, Value, ahash::RandomState>,
    key_locks: DashMap<Vec<u8>, Arc<AsyncMutex<()>>, ahash::RandomState>,
    range_cache: RwLock<Option<RangeCache>>,
}

impl MemoryBucket {
    fn new() -> Self {
        Self {
            data: DashMap::default(),
            key_locks: DashMap::default(),
            range_cache: RwLock::new(None),
        }
    }

    fn lock_for(&self, key: &[u8]) -> Arc<AsyncMutex<()>> {
        self.key_locks
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    async fn put(&self, key: Vec<u8>, value: Value) {
        self.data.insert(key, value);
    }

    async fn conditional_put(
        &self,
        key: Vec<u8>,
        value: Value,
        guard: Option<Guard>,
    ) -> Result<(), StoreOperationError> {
        let lock = self.lock_for(&key);
        let _held = lock.lock().await;

        if let Some(existing) = self.data.get(&key) {
            if let Some(guard) = guard {
                if !guard.condition.is_satisfied(&existing, &guard.expression) {
                    return Err(StoreOperationError::Conflict);
                }
            }
        }
        self.data.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Option<Value> {
        self.data.get(key).map(|v| v.clone())
    }

    async fn get_guarded(
        &self,
        key: &[u8],
        guard: Option<&Guard>,
    ) -> Result<Value, StoreOperationError> {
        let existing = self
            .data
            .get(key)
            .map(|v| v.clone())
            .ok_or(StoreOperationError::KeyNotFound)?;
        if let Some(guard) = guard {
            if !guard.condition.is_satisfied(&existing, &guard.expression) {
                return Err(StoreOperationError::Conflict);
            }
        }
        Ok(existing)
    }

    async fn remove(&self, key: &[u8]) -> Option<Value> {
        self.data.remove(key).map(|(_, v)| v)
    }

    async fn update(
        &self,
        key: &[u8],
        function: Arc<dyn Function>,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), StoreOperationError> {
        let lock = self.lock_for(key);
        let key = key.to_vec();
        let _held = lock.lock().await;

        // `Function::apply` is a plain synchronous callable; running it
        // inline would block this task for its whole duration and starve the
        // timeout's own timer. `spawn_blocking` gives the deadline a thread
        // to actually race against. A timed-out function keeps running to
        // completion on the blocking pool, but nothing reads its result, so
        // it never reaches `self.data`.
        let existing = self.data.get(&key).map(|v| v.clone());
        let blocking_key = key.clone();
        let handle =
            tokio::task::spawn_blocking(move || function.apply(&blocking_key, existing.as_ref(), &params));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(updated))) => {
                self.data.insert(key, updated);
                Ok(())
            }
            Ok(Ok(Err(msg))) => Err(StoreOperationError::BadRequest(msg.message)),
            Ok(Err(_join_error)) => Err(StoreOperationError::Internal("update function panicked".to_string())),
            Err(_elapsed) => Err(StoreOperationError::Timeout(timeout)),
        }
    }

    async fn keys(&self) -> Vec<Vec<u8>> {
        self.data.iter().map(|e| e.key().clone()).collect()
    }

    async fn keys_in_range(
        &self,
        range: &Range,
        comparator: Arc<dyn Comparator>,
        ttl: Duration,
    ) -> Vec<Vec<u8>> {
        let fresh_enough = |cache: &RangeCache| ttl > Duration::ZERO && cache.taken_at.elapsed() < ttl;

        let sorted_keys = {
            let cached = self.range_cache.read();
            if let Some(cache) = cached.as_ref() {
                if fresh_enough(cache) {
                    Some(cache.sorted_keys.clone())
                } else {
                    None
                }
            } else {
                None
            }
        };

        let sorted_keys = match sorted_keys {
            Some(keys) => keys,
            None => {
                let mut keys: Vec<Vec<u8>> = self.data.iter().map(|e| e.key().clone()).collect();
                keys.sort_by(|a, b| comparator.compare(a, b));
                *self.range_cache.write() = Some(RangeCache {
                    taken_at: Instant::now(),
                    sorted_keys: keys.clone(),
                });
                keys
            }
        };

        let mut result: Vec<Vec<u8>> = sorted_keys
            .into_iter()
            .filter(|k| {
                comparator.compare(k, &range.start_key) != std::cmp::Ordering::Less
                    && comparator.compare(k, &range.end_key) != std::cmp::Ordering::Greater
            })
            .collect();

        if !range.is_unlimited() {
            result.truncate(range.limit);
        }
        result
    }

    async fn get_values(
        &self,
        keys: &[Vec<u8>],
        guard: Option<&Guard>,
    ) -> HashMap<Vec<u8>, Value> {
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.data.get(key) {
                let passes = match guard {
                    Some(guard) => guard.condition.is_satisfied(&value, &guard.expression),
                    None => true,
                };
                if passes {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        out
    }
}

/// In-process reference `Store`: a map of bucket name to [`MemoryBucket`].
#[derive(Default)]
pub struct MemoryStore {
    buckets: DashMap<String, Arc<MemoryBucket>, ahash::RandomState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, bucket_name: &str) -> Option<Arc<dyn Bucket>> {
        self.buckets
            .get(bucket_name)
            .map(|b| b.clone() as Arc<dyn Bucket>)
    }

    async fn get_or_create(&self, bucket_name: &str) -> Arc<dyn Bucket> {
        self.buckets
            .entry(bucket_name.to_string())
            .or_insert_with(|| Arc::new(MemoryBucket::new()))
            .clone() as Arc<dyn Bucket>
    }

    async fn remove(&self, bucket_name: &str) {
        self.buckets.remove(bucket_name);
    }

    async fn bucket_names(&self) -> Vec<String> {
        self.buckets.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{builtin_registries, JsonEqualityCondition, LexicographicComparator};
    use std::time::Duration;

    fn val(v: serde_json::Value) -> Value {
        Value::from_json(v).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemoryStore::new();
        let bucket = store.get_or_create("b").await;
        bucket.put(b"k1".to_vec(), val(serde_json::json!({"v": 1}))).await;
        let got = bucket.get(b"k1").await.unwrap();
        assert_eq!(got.as_json(), &serde_json::json!({"v": 1}));
    }

    #[tokio::test]
    async fn conditional_put_conflict_leaves_value_untouched() {
        let store = MemoryStore::new();
        let bucket = store.get_or_create("b").await;
        bucket.put(b"k1".to_vec(), val(serde_json::json!({"v": 1}))).await;

        let guard = Guard {
            condition: Arc::new(JsonEqualityCondition),
            expression: r#"{"v":2}"#.to_string(),
        };
        let result = bucket
            .conditional_put(b"k1".to_vec(), val(serde_json::json!({"v": 2})), Some(guard))
            .await;
        assert!(matches!(result, Err(StoreOperationError::Conflict)));
        assert_eq!(
            bucket.get(b"k1").await.unwrap().as_json(),
            &serde_json::json!({"v": 1})
        );
    }

    #[tokio::test]
    async fn conditional_put_succeeds_when_absent() {
        let store = MemoryStore::new();
        let bucket = store.get_or_create("b").await;
        let result = bucket
            .conditional_put(b"new".to_vec(), val(serde_json::json!({"v": 1})), None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn range_query_returns_ordered_inclusive_subset() {
        let store = MemoryStore::new();
        let bucket = store.get_or_create("b").await;
        for k in ["a", "b", "c", "d"] {
            bucket.put(k.as_bytes().to_vec(), val(serde_json::json!({}))).await;
        }
        let range = Range::new(b"a".to_vec(), b"c".to_vec(), 0, "order");
        let comparator = Arc::new(LexicographicComparator);
        let keys = bucket.keys_in_range(&range, comparator, Duration::ZERO).await;
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn update_times_out_and_leaves_value_unchanged() {
        struct SlowFunction;
        impl Function for SlowFunction {
            fn apply(
                &self,
                _key: &[u8],
                value: Option<&Value>,
                _params: &serde_json::Value,
            ) -> Result<Value, crate::error::ErrorMessage> {
                std::thread::sleep(Duration::from_millis(200));
                Ok(value.cloned().unwrap_or_else(|| val(serde_json::json!({}))))
            }
        }

        let store = MemoryStore::new();
        let bucket = store.get_or_create("b").await;
        bucket.put(b"k1".to_vec(), val(serde_json::json!({"v": 1}))).await;

        let result = bucket
            .update(b"k1", Arc::new(SlowFunction), serde_json::json!({}), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(StoreOperationError::Timeout(_))));
        assert_eq!(
            bucket.get(b"k1").await.unwrap().as_json(),
            &serde_json::json!({"v": 1})
        );
    }

    #[tokio::test]
    async fn update_applies_function_under_lock() {
        let (functions, _, _) = builtin_registries();
        let merge = functions.resolve("merge").unwrap();

        let store = MemoryStore::new();
        let bucket = store.get_or_create("b").await;
        bucket.put(b"k1".to_vec(), val(serde_json::json!({"a": 1}))).await;

        bucket
            .update(b"k1", merge, serde_json::json!({"b": 2}), Duration::from_millis(500))
            .await
            .unwrap();

        assert_eq!(
            bucket.get(b"k1").await.unwrap().as_json(),
            &serde_json::json!({"a": 1, "b": 2})
        );
    }

    #[tokio::test]
    async fn store_tracks_bucket_inventory() {
        let store = MemoryStore::new();
        assert!(store.get("b").await.is_none());
        store.get_or_create("b").await;
        assert_eq!(store.bucket_names().await, vec!["b".to_string()]);
        store.remove("b").await;
        assert!(store.bucket_names().await.is_empty());
    }
}
