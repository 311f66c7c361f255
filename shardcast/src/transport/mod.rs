//! The boundary between a broker and the nodes it sends sub-requests to.
//!
//! Serialization and networking live behind [NodeTransport]. [LocalTransport]
//! delivers sub-requests to [CoreService](crate::service::CoreService)s
//! running in the same process.

mod local;

pub use local::LocalTransport;

use std::sync::Arc;

use async_trait::async_trait;

use crate::cluster::Node;
use crate::errors::TransportError;

/// Sends one sub-request to one node and waits for its result.
///
/// Implementations do not need to apply a deadline: the broker drops calls that
/// outlive it.
#[async_trait]
pub trait NodeTransport<Req, Res>: Send + Sync {
    /// Sends `request` to `node`.
    async fn send_to_node(&self, request: Req, node: &Arc<Node>) -> Result<Res, TransportError>;
}
