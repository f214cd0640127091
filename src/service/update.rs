//! UpdateService: point operations: schema ops, puts, removes, and
//! named updates, each resolved to exactly one node.

use std::sync::Arc;

use crate::error::ServiceResult;
use crate::predicate::Predicate;
use crate::protocol::{Command, Update};
use crate::registry::FunctionRegistry;
use crate::router::Router;
use crate::value::Value;

pub struct UpdateService {
    router: Arc<Router>,
    functions: Arc<FunctionRegistry>,
}

impl UpdateService {
    pub fn new(router: Arc<Router>, functions: Arc<FunctionRegistry>) -> Self {
        Self { router, functions }
    }

    /// Bucket schema operations are local to a node and propagated lazily
    /// by discovery/reads on other clusters.
    pub async fn add_bucket(&self, bucket: &str) -> ServiceResult<()> {
        let command = Command::AddBucket { bucket: bucket.to_string() };
        let node = command.execute_on_router(&self.router)?;
        node.send(command).await?;
        Ok(())
    }

    pub async fn remove_bucket(&self, bucket: &str) -> ServiceResult<()> {
        let command = Command::RemoveBucket { bucket: bucket.to_string() };
        let node = command.execute_on_router(&self.router)?;
        node.send(command).await?;
        Ok(())
    }

    pub async fn put_value(
        &self,
        bucket: &str,
        key: Vec<u8>,
        value: Value,
        predicate: &str,
    ) -> ServiceResult<()> {
        let predicate = Predicate::parse(predicate)?;
        let command = Command::PutValue {
            bucket: bucket.to_string(),
            key,
            value,
            predicate,
        };
        let node = command.execute_on_router(&self.router)?;
        node.send(command).await?;
        Ok(())
    }

    pub async fn remove_value(&self, bucket: &str, key: Vec<u8>) -> ServiceResult<()> {
        let command = Command::RemoveValue { bucket: bucket.to_string(), key };
        let node = command.execute_on_router(&self.router)?;
        node.send(command).await?;
        Ok(())
    }

    /// Resolves the named function eagerly, so an unknown function fails
    /// `BAD_REQUEST` at the caller rather than round-tripping to the
    /// terminal node first. The command still only carries the
    /// function *name*: the terminal node resolves it again from its own
    /// registry, per the command protocol's wire contract.
    pub async fn execute_update(&self, bucket: &str, key: Vec<u8>, update: Update) -> ServiceResult<()> {
        self.functions.resolve(&update.function_name)?;
        let command = Command::Update {
            bucket: bucket.to_string(),
            key,
            update,
        };
        let node = command.execute_on_router(&self.router)?;
        node.send(command).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::node::LocalNode;
    use crate::cluster::ClusterId;
    use crate::error::ErrorCode;
    use crate::registry::builtin_registries;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn service() -> (UpdateService, Arc<Router>) {
        let (functions, conditions, comparators) = builtin_registries();
        let functions = Arc::new(functions);
        let router = Arc::new(Router::new(ClusterId::new("local"), []));
        let local_node: Arc<dyn crate::cluster::node::Node> = Arc::new(LocalNode::new(
            "local",
            Arc::new(MemoryStore::new()),
            functions.clone(),
            Arc::new(conditions),
            Arc::new(comparators),
            Duration::from_secs(1),
            Duration::ZERO,
            4,
        ));
        router.set_local_node(local_node.clone());
        router.add_route_to(&ClusterId::new("local"), local_node);
        (UpdateService::new(router.clone(), functions), router)
    }

    #[tokio::test]
    async fn put_then_check_routing_succeeds() {
        let (service, _router) = service();
        service.add_bucket("b").await.unwrap();
        service
            .put_value("b", b"k1".to_vec(), Value::from_json(serde_json::json!({"v": 1})).unwrap(), "")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn conditional_put_conflict_surfaces_conflict_code() {
        let (service, _router) = service();
        service
            .put_value("b", b"k1".to_vec(), Value::from_json(serde_json::json!({"v": 1})).unwrap(), "")
            .await
            .unwrap();

        let result = service
            .put_value(
                "b",
                b"k1".to_vec(),
                Value::from_json(serde_json::json!({"v": 2})).unwrap(),
                r#"eq:{"v":2}"#,
            )
            .await;
        match result {
            Err(e) => assert_eq!(e.0.code, ErrorCode::Conflict),
            Ok(()) => panic!("expected conflict"),
        }
    }

    #[tokio::test]
    async fn execute_update_with_unknown_function_is_bad_request() {
        let (service, _router) = service();
        service.add_bucket("b").await.unwrap();
        let result = service
            .execute_update(
                "b",
                b"k1".to_vec(),
                Update {
                    function_name: "nope".to_string(),
                    timeout_ms: 100,
                    params: serde_json::json!({}),
                },
            )
            .await;
        match result {
            Err(e) => assert_eq!(e.0.code, ErrorCode::BadRequest),
            Ok(()) => panic!("expected bad request"),
        }
    }
}
