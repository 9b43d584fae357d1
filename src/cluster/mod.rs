//! Cluster transport — how a tool call reaches a peer node.
//!
//! The proxy wraps a call as a [`ToolCallRequest`] envelope and hands it to a
//! [`ClusterTransport`] addressed at the peer's dispatcher endpoint. The peer
//! answers with a [`ToolCallResponse`]; failures are carried as data.

pub mod ipc;
pub mod mesh;

use crate::types::{NodeName, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use ipc::IpcTransport;
pub use mesh::{Mesh, MeshTransport};

/// Well-known endpoint name every node's dispatcher answers on.
pub const DISPATCHER_ENDPOINT: &str = "mcp";

/// Cross-node call envelope. `params` is the JSON-serialized argument
/// object, kept opaque so any transport codec can carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    pub params: String,
}

/// Peer answer: serialized result or an error message, never both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCallResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResponse {
    pub fn success(result: String) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Synchronous, timed request/response to a named peer.
///
/// Implementations must be safe for concurrent independent calls. A call
/// abandoned on timeout is not cancelled on the peer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Deliver `request` to `node`'s dispatcher endpoint and wait at most
    /// `timeout` for the answer. Round-trip failures are `Error::Transport`.
    async fn call(
        &self,
        node: &NodeName,
        request: ToolCallRequest,
        timeout: Duration,
    ) -> Result<ToolCallResponse>;

    /// Peers this transport can currently reach.
    async fn peers(&self) -> Vec<NodeName>;
}
