//! The receiving side of the wire protocol: accepts TCP
//! connections from other nodes' `RemoteNode`s and re-dispatches each
//! framed `Command` against the local `Store`.
//!
//! One task per connection, reading frames in a loop until the peer closes
//! the socket or a frame fails to decode. `Membership` is answered from a
//! shared view handle rather than the store, since membership isn't store
//! state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cluster::View;
use crate::error::ErrorMessage;
use crate::protocol::{read_frame, write_frame, Command, CommandReply};
use crate::registry::{ComparatorRegistry, ConditionRegistry, FunctionRegistry};
use crate::store::{Store, StoreContext};

/// Accepts connections on behalf of this process's local node and serves
/// every inbound `Command` against the given `Store`.
pub struct Listener {
    store: Arc<dyn Store>,
    functions: Arc<FunctionRegistry>,
    conditions: Arc<ConditionRegistry>,
    comparators: Arc<ComparatorRegistry>,
    default_update_timeout: Duration,
    range_cache_ttl_floor: Duration,
    workers: Arc<Semaphore>,
    local_view: Arc<RwLock<View>>,
}

impl Listener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        functions: Arc<FunctionRegistry>,
        conditions: Arc<ConditionRegistry>,
        comparators: Arc<ComparatorRegistry>,
        default_update_timeout: Duration,
        range_cache_ttl_floor: Duration,
        worker_pool_size: usize,
        local_view: Arc<RwLock<View>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            functions,
            conditions,
            comparators,
            default_update_timeout,
            range_cache_ttl_floor,
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            local_view,
        })
    }

    /// Bind `addr` and serve connections until the process is torn down.
    /// Each accepted connection is handled on its own task so one slow or
    /// hostile peer cannot stall the others.
    pub async fn serve(self: Arc<Self>, addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(local_addr = %listener.local_addr()?, "wire listener bound");
        loop {
            let (stream, peer) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                debug!(%peer, "accepted connection");
                if let Err(e) = this.handle_connection(stream).await {
                    debug!(%peer, error = %e, "connection closed");
                }
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) -> std::io::Result<()> {
        loop {
            let command: Command = read_frame(&mut stream).await?;
            let reply = self.dispatch(command).await;
            write_frame(&mut stream, &reply).await?;
        }
    }

    async fn dispatch(&self, command: Command) -> Result<CommandReply, ErrorMessage> {
        if let Command::Membership = command {
            return Ok(CommandReply::View(self.local_view.read().clone()));
        }

        let _permit = self
            .workers
            .acquire()
            .await
            .expect("worker pool semaphore is never closed");

        let ctx = StoreContext {
            store: self.store.as_ref(),
            functions: self.functions.as_ref(),
            conditions: self.conditions.as_ref(),
            comparators: self.comparators.as_ref(),
            default_update_timeout: self.default_update_timeout,
            range_cache_ttl_floor: self.range_cache_ttl_floor,
        };
        command.execute_on_store(&ctx).await.map_err(|e| {
            warn!(error = %e, "command execution failed");
            ErrorMessage::from(e)
        })
    }
}
