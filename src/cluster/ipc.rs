//! TCP transport to peers running the IPC server.
//!
//! One connection per call: connect, send a `cluster.ToolCall` request frame,
//! read the answer. The whole exchange is bounded by the call timeout.

use super::{ClusterTransport, ToolCallRequest, ToolCallResponse};
use crate::ipc::codec::{decode, encode, read_frame, write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use crate::types::{Error, NodeName, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{Error as IoError, ErrorKind};
use std::time::Duration;
use tokio::net::TcpStream;

/// IPC service / method a node's dispatcher answers cluster calls on.
pub const CLUSTER_SERVICE: &str = "cluster";
pub const TOOL_CALL_METHOD: &str = "ToolCall";

#[derive(Debug, Deserialize)]
struct ResponseFrame {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// [`ClusterTransport`] speaking the IPC frame protocol.
#[derive(Debug, Clone)]
pub struct IpcTransport {
    peers: HashMap<NodeName, String>,
    max_frame_bytes: u32,
}

impl IpcTransport {
    pub fn new(peers: HashMap<NodeName, String>, max_frame_bytes: u32) -> Self {
        Self {
            peers,
            max_frame_bytes,
        }
    }

    /// Build from the `proxy.peers` config table. Empty names are skipped.
    pub fn from_config(peers: &BTreeMap<String, String>, max_frame_bytes: u32) -> Self {
        let peers = peers
            .iter()
            .filter_map(|(name, addr)| {
                NodeName::from_string(name.clone())
                    .ok()
                    .map(|name| (name, addr.clone()))
            })
            .collect();
        Self::new(peers, max_frame_bytes)
    }

    async fn exchange(&self, addr: &str, request: &ToolCallRequest) -> std::io::Result<ToolCallResponse> {
        let mut stream = TcpStream::connect(addr).await?;

        let frame = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "service": CLUSTER_SERVICE,
            "method": TOOL_CALL_METHOD,
            "body": request,
        });
        write_frame(&mut stream, MSG_REQUEST, &encode(&frame)?).await?;

        let (msg_type, payload) = read_frame(&mut stream, self.max_frame_bytes)
            .await?
            .ok_or_else(|| IoError::new(ErrorKind::UnexpectedEof, "connection closed before response"))?;
        let response: ResponseFrame = decode(&payload)?;

        match msg_type {
            MSG_RESPONSE if response.ok => serde_json::from_value(response.body)
                .map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string())),
            MSG_ERROR | MSG_RESPONSE => {
                let message = response
                    .error
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "peer rejected the call".to_string());
                Err(IoError::new(ErrorKind::Other, message))
            }
            other => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("Unexpected message type: 0x{:02X}", other),
            )),
        }
    }
}

#[async_trait]
impl ClusterTransport for IpcTransport {
    async fn call(
        &self,
        node: &NodeName,
        request: ToolCallRequest,
        timeout: Duration,
    ) -> Result<ToolCallResponse> {
        let addr = self
            .peers
            .get(node)
            .ok_or_else(|| Error::transport(node.as_str(), "no address configured for peer"))?;

        tracing::debug!(peer = %node, %addr, tool = %request.tool, "forwarding tool call");

        match tokio::time::timeout(timeout, self.exchange(addr, &request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(Error::transport(node.as_str(), e.to_string())),
            Err(_) => Err(Error::transport(
                node.as_str(),
                format!("timed out after {:?}", timeout),
            )),
        }
    }

    async fn peers(&self) -> Vec<NodeName> {
        let mut names: Vec<NodeName> = self.peers.keys().cloned().collect();
        names.sort();
        names
    }
}
