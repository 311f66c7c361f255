use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::trace;

use super::NodeTransport;
use crate::cluster::Node;
use crate::errors::TransportError;
use crate::routing::NodeId;
use crate::service::{CoreService, PartitionSearcher, SearchCore};

/// Delivers sub-requests to in-process core services, one per node.
///
/// Each call runs on the blocking pool, driven by its own `block_on`. Searches block
/// their thread, so keeping them off the caller's scheduler lets the broker's
/// deadline fire even on a current-thread runtime. A panicking service breaks only
/// the call that hit it.
pub struct LocalTransport<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    services: HashMap<NodeId, Arc<CoreService<C, S>>>,
}

impl<C, S> LocalTransport<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    /// Creates a transport that knows no nodes.
    pub fn new() -> Self {
        LocalTransport {
            services: HashMap::new(),
        }
    }

    /// Registers the service answering for `node`.
    pub fn with_service(mut self, node: NodeId, service: Arc<CoreService<C, S>>) -> Self {
        self.register(node, service);
        self
    }

    /// Registers the service answering for `node`, replacing the previous one.
    pub fn register(&mut self, node: NodeId, service: Arc<CoreService<C, S>>) {
        self.services.insert(node, service);
    }

    /// The service answering for `node`, if any.
    pub fn service(&self, node: NodeId) -> Option<&Arc<CoreService<C, S>>> {
        self.services.get(&node)
    }
}

impl<C, S> Default for LocalTransport<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S> std::fmt::Debug for LocalTransport<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<_> = self.services.keys().collect();
        nodes.sort();
        f.debug_struct("LocalTransport")
            .field("nodes", &nodes)
            .finish()
    }
}

#[async_trait]
impl<C, S> NodeTransport<S::Request, S::Result> for LocalTransport<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    async fn send_to_node(
        &self,
        request: S::Request,
        node: &Arc<Node>,
    ) -> Result<S::Result, TransportError> {
        let service = self
            .services
            .get(&node.id)
            .cloned()
            .ok_or(TransportError::UnknownNode(node.id))?;
        trace!(node = %node, "Delivering sub-request locally");
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || handle.block_on(service.execute(request)))
            .await
            .map_err(|err| TransportError::ConnectionBroken(err.to_string()))
    }
}
