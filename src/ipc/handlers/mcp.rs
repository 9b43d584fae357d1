//! MCP service handler — tool discovery and invocation for clients.

use crate::dispatch::Dispatcher;
use crate::ipc::router::{object_field, str_field};
use crate::types::{Error, Result};
use serde_json::{json, Value};
use std::sync::Arc;

/// Protocol revision announced by `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

pub async fn handle(dispatcher: &Arc<Dispatcher>, method: &str, body: Value) -> Result<Value> {
    match method {
        "initialize" => {
            if let Some(client) = body.get("clientInfo") {
                let client_name = client.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
                let version = body
                    .get("protocolVersion")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                tracing::info!(client = %client_name, %version, "client initialized");
            }

            Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "instructions": format!(
                    "node-probe on {}. Use tools/list to discover inspection tools; pass \"node\" to run any tool on a peer.",
                    dispatcher.node().name()
                ),
            }))
        }

        "ping" => Ok(json!({})),

        "tools/list" => Ok(json!({
            "tools": dispatcher.registry().list(),
        })),

        "tools/call" => {
            let name = str_field(&body, "name")?;
            let arguments = object_field(&body, "arguments")?;

            let result = dispatcher.call(&name, arguments).await.map_err(|e| {
                tracing::debug!(tool = %name, error = %e, "tool call failed");
                e
            })?;
            Ok(serde_json::to_value(result)?)
        }

        _ => Err(Error::not_found(format!("Unknown mcp method: {}", method))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::tools::{register_builtin_tools, ToolRegistry};

    fn dispatcher() -> Arc<Dispatcher> {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, false);
        testing::local_dispatcher("alpha@localhost", registry)
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let dispatcher = dispatcher();

        let init = handle(
            &dispatcher,
            "initialize",
            json!({"protocolVersion": PROTOCOL_VERSION, "clientInfo": {"name": "cli", "version": "1"}}),
        )
        .await
        .unwrap();
        assert_eq!(init["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["serverInfo"]["name"], "node-probe");
        assert!(init["capabilities"]["tools"].is_object());

        assert_eq!(handle(&dispatcher, "ping", json!({})).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_tools_list_carries_schemas() {
        let dispatcher = dispatcher();

        let body = handle(&dispatcher, "tools/list", json!({})).await.unwrap();
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), dispatcher.registry().len());

        let start = tools.iter().find(|t| t["name"] == "sample_start").unwrap();
        assert_eq!(start["inputSchema"]["type"], "object");
        assert!(start["inputSchema"]["properties"]["node"].is_object());
        assert!(start["inputSchema"]["properties"]["tool"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let dispatcher = dispatcher();

        let body = handle(
            &dispatcher,
            "tools/call",
            json!({"name": "node_info", "arguments": {}}),
        )
        .await
        .unwrap();
        assert_eq!(body["content"][0]["type"], "text");
        assert!(body.get("isError").is_none());

        // arguments may be omitted
        assert!(handle(&dispatcher, "tools/call", json!({"name": "sample_list"}))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_tools_call_errors_keep_their_code() {
        let dispatcher = dispatcher();

        let err = handle(&dispatcher, "tools/call", json!({"name": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_ipc_error_code(), "NOT_FOUND");

        let err = handle(
            &dispatcher,
            "tools/call",
            json!({"name": "sample_start", "arguments": {"interval_ms": "fast"}}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_ipc_error_code(), "INVALID_ARGUMENT");

        let err = handle(&dispatcher, "tools/call", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = handle(&dispatcher, "resources/list", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
