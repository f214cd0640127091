//! Node: the transport abstraction Commands travel over.
//!
//! A Node is a transport endpoint identified by (name, host, port); it is
//! connected, sent Commands, and disconnected explicitly. `LocalNode`
//! dispatches through a bounded worker pool straight into the local
//! `Store`. `RemoteNode` speaks the length-prefixed bincode wire protocol
//! over a Tokio `TcpStream`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock as SyncRwLock;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::cluster::View;
use crate::error::{ErrorMessage, ProcessingError};
use crate::protocol::{read_frame, write_frame, Command, CommandReply};
use crate::registry::{ComparatorRegistry, ConditionRegistry, FunctionRegistry};
use crate::store::{Store, StoreContext};

/// Lifecycle state of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Disconnected,
    Connected,
    Failed,
}

/// Transport abstraction: connect, send a Command and await its reply,
/// disconnect. Implementations must make `disconnect` idempotent and
/// best-effort.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> NodeState;
    async fn connect(&self) -> Result<(), ProcessingError>;
    async fn disconnect(&self);
    async fn send(&self, command: Command) -> Result<CommandReply, ProcessingError>;
}

/// The local process's own node: no transport, dispatches synchronously
/// through a bounded worker pool.
pub struct LocalNode {
    name: String,
    store: Arc<dyn Store>,
    functions: Arc<FunctionRegistry>,
    conditions: Arc<ConditionRegistry>,
    comparators: Arc<ComparatorRegistry>,
    default_update_timeout: Duration,
    range_cache_ttl_floor: Duration,
    workers: Arc<Semaphore>,
    /// This node's own cluster membership view, mutated by the clustered
    /// runtime's membership callback rather than by discovery: the local
    /// cluster is never discovered.
    local_view: Arc<SyncRwLock<View>>,
}

impl LocalNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        functions: Arc<FunctionRegistry>,
        conditions: Arc<ConditionRegistry>,
        comparators: Arc<ComparatorRegistry>,
        default_update_timeout: Duration,
        range_cache_ttl_floor: Duration,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            functions,
            conditions,
            comparators,
            default_update_timeout,
            range_cache_ttl_floor,
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            local_view: Arc::new(SyncRwLock::new(View::empty())),
        }
    }

    /// A handle the owning process's membership callback can use to push
    /// view updates without routing them through the Discovery loop.
    pub fn local_view_handle(&self) -> Arc<SyncRwLock<View>> {
        self.local_view.clone()
    }

    pub fn set_local_view(&self, view: View) {
        *self.local_view.write() = view;
    }
}

#[async_trait]
impl Node for LocalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> NodeState {
        NodeState::Connected
    }

    async fn connect(&self) -> Result<(), ProcessingError> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn send(&self, command: Command) -> Result<CommandReply, ProcessingError> {
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
        command
            .execute_on_store(&ctx)
            .await
            .map_err(|e| ProcessingError::Remote(ErrorMessage::from(e)))
    }
}

/// A node reachable over the network: maintains an explicit transport
/// session. `connect`/`disconnect` are idempotent no-ops when
/// already in the target state.
pub struct RemoteNode {
    name: String,
    host: String,
    port: u16,
    transport: AsyncMutex<Option<TcpStream>>,
    state: SyncRwLock<NodeState>,
}

impl RemoteNode {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            transport: AsyncMutex::new(None),
            state: SyncRwLock::new(NodeState::Disconnected),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl Node for RemoteNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> NodeState {
        *self.state.read()
    }

    async fn connect(&self) -> Result<(), ProcessingError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                *self.state.write() = NodeState::Failed;
                ProcessingError::Transport(e)
            })?;
        *self.transport.lock().await = Some(stream);
        *self.state.write() = NodeState::Connected;
        Ok(())
    }

    async fn disconnect(&self) {
        // Best-effort cleanup: dropping the stream issues a TCP close;
        // any I/O error doing so is not the caller's problem.
        let _ = self.transport.lock().await.take();
        *self.state.write() = NodeState::Disconnected;
    }

    async fn send(&self, command: Command) -> Result<CommandReply, ProcessingError> {
        let mut guard = self.transport.lock().await;
        let stream = guard.as_mut().ok_or(ProcessingError::Disconnected)?;

        if let Err(e) = write_frame(stream, &command).await {
            *self.state.write() = NodeState::Failed;
            return Err(ProcessingError::Transport(e));
        }

        let reply: Result<CommandReply, ErrorMessage> = match read_frame(stream).await {
            Ok(reply) => reply,
            Err(e) => {
                *self.state.write() = NodeState::Failed;
                return Err(ProcessingError::Transport(e));
            }
        };

        reply.map_err(ProcessingError::Remote)
    }
}

/// Constructs a [`RemoteNode`] for a discovered [`crate::cluster::Member`]
///. A plain function suffices since
/// `RemoteNode` has no collaborators to inject beyond host/port/name.
pub fn remote_node_factory(member: &crate::cluster::Member) -> Arc<dyn Node> {
    Arc::new(RemoteNode::new(&member.name, &member.host, member.port))
}
