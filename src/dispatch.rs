//! Dispatcher and cluster proxy.
//!
//! Every tool invocation goes through [`Dispatcher::call`]: an empty target
//! or the local node name dispatches into the registry; any other target is
//! wrapped in a [`ToolCallRequest`] envelope and forwarded to that peer.
//!
//! A forwarded call that times out is abandoned locally only; the peer runs
//! it to completion.

use crate::cluster::{ClusterTransport, ToolCallRequest, ToolCallResponse};
use crate::node::Node;
use crate::tools::{ToolContext, ToolRegistry, ToolResult, NODE_PARAM};
use crate::types::{Error, NodeName, Result};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Routes tool calls to the local registry or a peer.
pub struct Dispatcher {
    node: Node,
    registry: Arc<ToolRegistry>,
    transport: Arc<dyn ClusterTransport>,
    call_timeout: Duration,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("node", self.node.name())
            .field("tools", &self.registry.len())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// Routing target named by a `"node"` string member of the arguments.
pub fn target_node(args: &Value) -> Option<&str> {
    args.get(NODE_PARAM).and_then(Value::as_str)
}

impl Dispatcher {
    pub fn new(
        node: Node,
        registry: Arc<ToolRegistry>,
        transport: Arc<dyn ClusterTransport>,
        call_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            registry,
            transport,
            call_timeout,
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Invoke `tool`, routed by the `"node"` member of `args`.
    pub async fn call(self: &Arc<Self>, tool: &str, args: Value) -> Result<ToolResult> {
        let target = target_node(&args).map(str::to_owned);
        self.call_on(tool, args, target.as_deref(), None).await
    }

    /// Invoke `tool` on an explicit target. `timeout` overrides the default
    /// forwarding timeout.
    pub async fn call_on(
        self: &Arc<Self>,
        tool: &str,
        args: Value,
        target: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ToolResult> {
        match target {
            Some(target) if !target.is_empty() && target != self.node.name().as_str() => {
                let peer = NodeName::from_string(target.to_string())
                    .map_err(|e| Error::invalid_params(e.to_string()))?;
                self.forward(&peer, tool, &args, timeout.unwrap_or(self.call_timeout))
                    .await
            }
            _ => self.dispatch_local(tool, args).await,
        }
    }

    async fn dispatch_local(self: &Arc<Self>, tool: &str, args: Value) -> Result<ToolResult> {
        let ctx = ToolContext::new(self.clone());
        self.registry.dispatch(&ctx, tool, args).await
    }

    async fn forward(
        &self,
        peer: &NodeName,
        tool: &str,
        args: &Value,
        timeout: Duration,
    ) -> Result<ToolResult> {
        let request = ToolCallRequest {
            tool: tool.to_string(),
            params: serde_json::to_string(args)?,
        };

        tracing::debug!(peer = %peer, tool, ?timeout, "proxying tool call");

        let response = self.transport.call(peer, request, timeout).await?;
        match response {
            ToolCallResponse {
                error: Some(message),
                ..
            } => Err(Error::remote_tool(peer.as_str(), message)),
            ToolCallResponse {
                result: Some(raw), ..
            } => serde_json::from_str(&raw).map_err(|e| {
                tracing::warn!(peer = %peer, tool, error = %e, "cannot decode remote result");
                Error::from(e)
            }),
            ToolCallResponse {
                result: None,
                error: None,
            } => Err(Error::internal(format!(
                "unexpected empty response from {}",
                peer
            ))),
        }
    }

    /// Serve an envelope received from a peer. Failures become data.
    ///
    /// The arguments are dispatched locally as-is: a `"node"` member naming
    /// this node is ignored by routing, so forwarded calls never bounce.
    pub async fn handle_remote(self: &Arc<Self>, request: ToolCallRequest) -> ToolCallResponse {
        let args: Value = if request.params.is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&request.params) {
                Ok(args) => args,
                Err(e) => {
                    return ToolCallResponse::failure(format!("invalid params: {}", e));
                }
            }
        };

        match self.dispatch_local(&request.tool, args).await {
            Ok(result) => match serde_json::to_string(&result) {
                Ok(raw) => ToolCallResponse::success(raw),
                Err(e) => ToolCallResponse::failure(e.to_string()),
            },
            Err(e) => ToolCallResponse::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterTransport;
    use crate::testing;
    use crate::tools::{handler_fn, ToolDefinition};
    use mockall::predicate::always;
    use serde_json::json;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new(
            "echo",
            "echo arguments",
            json!({"type": "object", "properties": {}}),
            handler_fn(|ctx, params| async move {
                Ok(ToolResult::text(format!("{} {}", ctx.node().name(), params)))
            }),
        ));
        registry
    }

    fn dispatcher(transport: MockClusterTransport) -> Arc<Dispatcher> {
        Dispatcher::new(
            testing::node("alpha@localhost"),
            Arc::new(registry()),
            Arc::new(transport),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_local_target_never_builds_envelope() {
        let mut transport = MockClusterTransport::new();
        transport.expect_call().never();
        let dispatcher = dispatcher(transport);

        let result = dispatcher
            .call("echo", json!({"node": "alpha@localhost", "x": 1}))
            .await
            .unwrap();
        assert!(result.text_content().starts_with("alpha@localhost"));

        // no target at all
        assert!(dispatcher.call("echo", json!({})).await.is_ok());
        // empty target
        assert!(dispatcher
            .call_on("echo", json!({}), Some(""), None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_remote_target_is_wrapped() {
        let mut transport = MockClusterTransport::new();
        transport
            .expect_call()
            .withf(|node, request, timeout| {
                node.as_str() == "beta@localhost"
                    && request.tool == "echo"
                    && serde_json::from_str::<Value>(&request.params).unwrap()["x"] == 1
                    && *timeout == Duration::from_secs(30)
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(ToolCallResponse::success(
                    serde_json::to_string(&ToolResult::text("from beta")).unwrap(),
                ))
            });
        let dispatcher = dispatcher(transport);

        let result = dispatcher
            .call("echo", json!({"node": "beta@localhost", "x": 1}))
            .await
            .unwrap();
        assert_eq!(result.text_content(), "from beta");
    }

    #[tokio::test]
    async fn test_remote_error_surfaces_as_tool_error() {
        let mut transport = MockClusterTransport::new();
        transport
            .expect_call()
            .returning(|_, _, _| Ok(ToolCallResponse::failure("unknown tool: nope")));
        let dispatcher = dispatcher(transport);

        let err = dispatcher
            .call("nope", json!({"node": "beta@localhost"}))
            .await
            .unwrap_err();
        assert!(!err.is_transport());
        match err {
            Error::RemoteTool { node, message } => {
                assert_eq!(node, "beta@localhost");
                assert_eq!(message, "unknown tool: nope");
            }
            other => panic!("expected RemoteTool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_and_timeout_override() {
        let mut transport = MockClusterTransport::new();
        transport
            .expect_call()
            .with(always(), always(), mockall::predicate::eq(Duration::from_millis(250)))
            .returning(|node, _, _| Err(Error::transport(node.as_str(), "connection refused")));
        let dispatcher = dispatcher(transport);

        let err = dispatcher
            .call_on(
                "echo",
                json!({}),
                Some("beta@localhost"),
                Some(Duration::from_millis(250)),
            )
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_undecodable_remote_result_fails_explicitly() {
        let mut transport = MockClusterTransport::new();
        transport
            .expect_call()
            .returning(|_, _, _| Ok(ToolCallResponse::success("not json".to_string())));
        let dispatcher = dispatcher(transport);

        let err = dispatcher
            .call("echo", json!({"node": "beta@localhost"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[tokio::test]
    async fn test_handle_remote_turns_errors_into_data() {
        let mut transport = MockClusterTransport::new();
        transport.expect_call().never();
        let dispatcher = dispatcher(transport);

        let response = dispatcher
            .handle_remote(ToolCallRequest {
                tool: "missing".to_string(),
                params: "{}".to_string(),
            })
            .await;
        assert_eq!(response.error.as_deref(), Some("unknown tool: missing"));
        assert!(response.result.is_none());

        let response = dispatcher
            .handle_remote(ToolCallRequest {
                tool: "echo".to_string(),
                params: r#"{"node":"alpha@localhost"}"#.to_string(),
            })
            .await;
        let result: ToolResult = serde_json::from_str(response.result.as_deref().unwrap()).unwrap();
        assert!(result.text_content().starts_with("alpha@localhost"));

        let response = dispatcher
            .handle_remote(ToolCallRequest {
                tool: "echo".to_string(),
                params: "{broken".to_string(),
            })
            .await;
        assert!(response.error.unwrap().starts_with("invalid params"));
    }
}
