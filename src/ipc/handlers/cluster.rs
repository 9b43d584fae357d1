//! Cluster service handler — tool call envelopes from peer proxies.

use crate::cluster::ipc::TOOL_CALL_METHOD;
use crate::cluster::ToolCallRequest;
use crate::dispatch::Dispatcher;
use crate::types::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

pub async fn handle(dispatcher: &Arc<Dispatcher>, method: &str, body: Value) -> Result<Value> {
    match method {
        TOOL_CALL_METHOD => {
            let request: ToolCallRequest = serde_json::from_value(body)
                .map_err(|e| Error::validation(format!("Invalid tool call envelope: {}", e)))?;

            tracing::debug!(tool = %request.tool, "serving proxied tool call");
            let response = dispatcher.handle_remote(request).await;
            Ok(serde_json::to_value(response)?)
        }

        _ => Err(Error::not_found(format!("Unknown cluster method: {}", method))),
    }
}
