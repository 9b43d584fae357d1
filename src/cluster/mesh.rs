//! In-process cluster: named dispatcher endpoints joined by channels.
//!
//! Each joined node gets an inbox of `(request, reply)` pairs served by a
//! background task; a call is a send plus a timed wait on the oneshot reply.
//! Used to run several nodes in one process (tests, embedded clusters).

use super::{ClusterTransport, ToolCallRequest, ToolCallResponse};
use crate::dispatch::Dispatcher;
use crate::types::{Error, NodeName, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

type Inbox = mpsc::UnboundedSender<(ToolCallRequest, oneshot::Sender<ToolCallResponse>)>;

/// Registry of reachable dispatcher endpoints.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    endpoints: Arc<RwLock<HashMap<NodeName, Inbox>>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport handle for the node named `local`.
    pub fn transport(&self, local: NodeName) -> MeshTransport {
        MeshTransport {
            mesh: self.clone(),
            local,
        }
    }

    /// Expose `dispatcher` as its node's endpoint.
    ///
    /// Every request is served on its own task so a slow tool does not hold
    /// up other callers.
    pub async fn join(&self, dispatcher: Arc<Dispatcher>) -> Result<JoinHandle<()>> {
        let name = dispatcher.node().name().clone();
        let (tx, mut rx) =
            mpsc::unbounded_channel::<(ToolCallRequest, oneshot::Sender<ToolCallResponse>)>();

        {
            let mut endpoints = self.endpoints.write().await;
            if endpoints.contains_key(&name) {
                return Err(Error::validation(format!(
                    "Node already joined the mesh: {}",
                    name
                )));
            }
            endpoints.insert(name.clone(), tx);
        }

        tracing::debug!(node = %name, "node joined mesh");

        Ok(tokio::spawn(async move {
            while let Some((request, reply)) = rx.recv().await {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let response = dispatcher.handle_remote(request).await;
                    // caller may have timed out already
                    let _ = reply.send(response);
                });
            }
            tracing::debug!(node = %name, "mesh endpoint closed");
        }))
    }

    /// Remove a node's endpoint. In-flight requests still complete.
    pub async fn leave(&self, node: &NodeName) -> bool {
        self.endpoints.write().await.remove(node).is_some()
    }

    pub async fn members(&self) -> Vec<NodeName> {
        let mut names: Vec<NodeName> = self.endpoints.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// [`ClusterTransport`] over a [`Mesh`].
#[derive(Debug, Clone)]
pub struct MeshTransport {
    mesh: Mesh,
    local: NodeName,
}

#[async_trait]
impl ClusterTransport for MeshTransport {
    async fn call(
        &self,
        node: &NodeName,
        request: ToolCallRequest,
        timeout: Duration,
    ) -> Result<ToolCallResponse> {
        let inbox = self
            .mesh
            .endpoints
            .read()
            .await
            .get(node)
            .cloned()
            .ok_or_else(|| Error::transport(node.as_str(), "no route to node"))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        inbox
            .send((request, reply_tx))
            .map_err(|_| Error::transport(node.as_str(), "endpoint is shutting down"))?;

        tokio::time::timeout(timeout, reply_rx)
            .await
            .map_err(|_| {
                Error::transport(node.as_str(), format!("timed out after {:?}", timeout))
            })?
            .map_err(|_| Error::transport(node.as_str(), "endpoint dropped the call"))
    }

    async fn peers(&self) -> Vec<NodeName> {
        self.mesh
            .members()
            .await
            .into_iter()
            .filter(|name| *name != self.local)
            .collect()
    }
}
