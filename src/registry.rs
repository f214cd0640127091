//! Name-keyed operator registries.
//!
//! `Function`, `Condition`, and `Comparator` are external collaborators: the
//! core never implements update logic, guard logic, or ordering logic
//! itself, it only looks callables up by name and invokes them. They live in
//! an explicit table populated at process init.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{ErrorCode, ErrorMessage};
use crate::value::Value;

/// A pure, named update: `apply(key, value, params) -> value`. May be
/// killed by the caller's timeout; it must not spawn its own background
/// work or hold locks across an `.await`.
pub trait Function: Send + Sync {
    fn apply(&self, key: &[u8], value: Option<&Value>, params: &Json) -> Result<Value, ErrorMessage>;
}

/// A named guard evaluated against the existing value of a key.
pub trait Condition: Send + Sync {
    fn is_satisfied(&self, existing: &Value, expression: &str) -> bool;
}

/// A named total order over keys.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// A name-keyed table of `Arc<dyn T>`, populated at process init.
pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, entry: Arc<T>) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<T>, ErrorMessage> {
        self.get(name).ok_or_else(|| {
            ErrorMessage::new(ErrorCode::BadRequest, format!("unknown registry entry: {name}"))
        })
    }
}

pub type FunctionRegistry = Registry<dyn Function>;
pub type ConditionRegistry = Registry<dyn Condition>;
pub type ComparatorRegistry = Registry<dyn Comparator>;

/// Comparator over raw bytes, used whenever no `comparatorName` is given.
pub struct LexicographicComparator;

impl Comparator for LexicographicComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// `eq:<json>`: satisfied iff the existing document equals the parsed expression.
pub struct JsonEqualityCondition;

impl Condition for JsonEqualityCondition {
    fn is_satisfied(&self, existing: &Value, expression: &str) -> bool {
        match serde_json::from_str::<Json>(expression) {
            Ok(expected) => existing.as_json() == &expected,
            Err(_) => false,
        }
    }
}

/// `merge`: shallow-merges `params` into the existing object (or inserts if absent).
pub struct MergeFunction;

impl Function for MergeFunction {
    fn apply(&self, _key: &[u8], value: Option<&Value>, params: &Json) -> Result<Value, ErrorMessage> {
        let mut base = match value {
            Some(v) => v.as_json().clone(),
            None => Json::Object(Default::default()),
        };
        if let (Json::Object(base_map), Json::Object(param_map)) = (&mut base, params) {
            for (k, v) in param_map {
                base_map.insert(k.clone(), v.clone());
            }
        } else {
            base = params.clone();
        }
        Value::from_json(base)
    }
}

/// Build the registries pre-populated with the built-ins used by the
/// in-process reference `Store` and its tests. Production deployments
/// register additional entries by name before constructing the services.
pub fn builtin_registries() -> (FunctionRegistry, ConditionRegistry, ComparatorRegistry) {
    let mut functions = FunctionRegistry::new();
    functions.register("merge", Arc::new(MergeFunction));

    let mut conditions = ConditionRegistry::new();
    conditions.register("eq", Arc::new(JsonEqualityCondition));

    let mut comparators = ComparatorRegistry::new();
    comparators.register("order", Arc::new(LexicographicComparator));

    (functions, conditions, comparators)
}
