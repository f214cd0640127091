use std::sync::Arc;
use std::time::Duration;

use ensemblestore::cluster::node::{LocalNode, Node};
use ensemblestore::cluster::{ClusterId, Member};
use ensemblestore::discovery::EnsembleManager;
use ensemblestore::listener::Listener;
use ensemblestore::registry::builtin_registries;
use ensemblestore::router::Router;
use ensemblestore::service::{QueryService, UpdateService};
use ensemblestore::store::MemoryStore;
use ensemblestore::{Config, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().await?;
    init_logging(&config.logging);

    info!(version = ensemblestore::VERSION, "starting ensemblestore node");

    let (functions, conditions, comparators) = builtin_registries();
    let functions = Arc::new(functions);
    let conditions = Arc::new(conditions);
    let comparators = Arc::new(comparators);

    let default_update_timeout = Duration::from_millis(config.update.default_timeout_ms);
    let range_cache_ttl_floor = Duration::from_millis(config.store.range_cache_ttl_floor_ms);

    let store = Arc::new(MemoryStore::new());
    let local_node_concrete = Arc::new(LocalNode::new(
        config.node.name.clone(),
        store.clone(),
        functions.clone(),
        conditions.clone(),
        comparators.clone(),
        default_update_timeout,
        range_cache_ttl_floor,
        config.node.worker_pool_size,
    ));
    let local_view_handle = local_node_concrete.local_view_handle();
    let local_node: Arc<dyn Node> = local_node_concrete;

    let local_cluster = ClusterId::new(config.local_cluster.clone());
    let remote_clusters = config.remote_cluster_ids();
    let router = Arc::new(Router::new(local_cluster.clone(), remote_clusters.clone()));
    router.set_local_node(local_node.clone());
    router.add_route_to(&local_cluster, local_node.clone());

    let discovery_interval = Duration::from_millis(config.discovery.interval_ms);
    let manager = EnsembleManager::new(router.clone(), discovery_interval);
    for remote in &config.remote_clusters {
        let Some(seed) = remote.seeds.first() else {
            continue;
        };
        manager.join(
            ClusterId::new(remote.name.clone()),
            Member::new(remote.name.clone(), seed.host.clone(), seed.port),
        );
    }

    let update_service = UpdateService::new(router.clone(), functions.clone());
    let query_service = QueryService::new(router.clone(), conditions.clone(), comparators.clone());
    // Keep both services alive for the lifetime of the process; a real
    // boundary layer (HTTP/JSON) would hold these and translate
    // requests into service calls.
    let _ = (&update_service, &query_service);

    let listener = Listener::new(
        store,
        functions,
        conditions,
        comparators,
        default_update_timeout,
        range_cache_ttl_floor,
        config.node.worker_pool_size,
        local_view_handle,
    );
    let bind_addr = format!("{}:{}", config.node.bind_addr, config.node.port);
    info!(%bind_addr, "listening for inter-node traffic");
    let serve_handle = tokio::spawn(async move {
        if let Err(e) = listener.serve(bind_addr).await {
            tracing::error!(error = %e, "wire listener stopped");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = serve_handle => {
            tracing::error!("wire listener task exited unexpectedly");
        }
    }

    manager.shutdown().await;
    info!("ensemblestore node shut down");
    Ok(())
}

fn init_logging(config: &ensemblestore::config::LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if config.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
