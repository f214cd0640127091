//! `execute_update` timing out through the full service/routing path,
//! not just at the bucket level: the terminal node's deadline must still
//! leave the pre-update value in place and surface `TIMEOUT` to the
//! caller that issued the update through `UpdateService`.

use std::sync::Arc;
use std::time::Duration;

use ensemblestore::cluster::node::{LocalNode, Node};
use ensemblestore::cluster::ClusterId;
use ensemblestore::error::ErrorCode;
use ensemblestore::registry::{builtin_registries, Function};
use ensemblestore::router::Router;
use ensemblestore::service::{QueryService, UpdateService};
use ensemblestore::store::MemoryStore;
use ensemblestore::value::Value;
use ensemblestore::protocol::Update;

struct SlowFunction;

impl Function for SlowFunction {
    fn apply(
        &self,
        _key: &[u8],
        value: Option<&Value>,
        _params: &serde_json::Value,
    ) -> Result<Value, ensemblestore::error::ErrorMessage> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(value.cloned().unwrap_or_else(|| Value::from_json(serde_json::json!({})).unwrap()))
    }
}

#[tokio::test]
async fn execute_update_times_out_through_update_service_and_leaves_value_unchanged() {
    let local = ClusterId::new("local");
    let router = Arc::new(Router::new(local.clone(), []));

    let (mut functions, conditions, comparators) = builtin_registries();
    functions.register("slow", Arc::new(SlowFunction));
    let functions = Arc::new(functions);
    let conditions = Arc::new(conditions);
    let comparators = Arc::new(comparators);

    let node: Arc<dyn Node> = Arc::new(LocalNode::new(
        "local",
        Arc::new(MemoryStore::new()),
        functions.clone(),
        conditions.clone(),
        comparators.clone(),
        Duration::from_secs(1),
        Duration::ZERO,
        4,
    ));
    router.set_local_node(node.clone());
    router.add_route_to(&local, node);

    let update = UpdateService::new(router.clone(), functions);
    let query = QueryService::new(router, conditions, comparators);

    update.add_bucket("b").await.unwrap();
    update
        .put_value("b", b"k1".to_vec(), Value::from_json(serde_json::json!({"v": 1})).unwrap(), "")
        .await
        .unwrap();

    let result = update
        .execute_update(
            "b",
            b"k1".to_vec(),
            Update {
                function_name: "slow".to_string(),
                timeout_ms: 20,
                params: serde_json::json!({}),
            },
        )
        .await;
    match result {
        Err(e) => assert_eq!(e.0.code, ErrorCode::Timeout),
        Ok(()) => panic!("expected the update to time out"),
    }

    let got = query.get_value("b", b"k1".to_vec(), "").await.unwrap();
    assert_eq!(got.unwrap().as_json(), &serde_json::json!({"v": 1}));
}
