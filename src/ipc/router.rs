//! Top-level IPC router — routes by service, delegates to handlers.

use crate::cluster::{DISPATCHER_ENDPOINT, ipc::CLUSTER_SERVICE};
use crate::dispatch::Dispatcher;
use crate::ipc::handlers;
use crate::types::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Route an IPC request to the appropriate service handler.
pub async fn route_request(
    dispatcher: &Arc<Dispatcher>,
    service: &str,
    method: &str,
    body: Value,
) -> Result<Value> {
    match service {
        DISPATCHER_ENDPOINT => handlers::mcp::handle(dispatcher, method, body).await,
        CLUSTER_SERVICE => handlers::cluster::handle(dispatcher, method, body).await,
        _ => Err(Error::not_found(format!("Unknown service: {}", service))),
    }
}

// =============================================================================
// Shared helpers for handler modules
// =============================================================================

pub fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", key)))
}

/// Object member `key`, or `{}` when absent or null.
pub fn object_field(body: &Value, key: &str) -> Result<Value> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(Value::Object(serde_json::Map::new())),
        Some(v @ Value::Object(_)) => Ok(v.clone()),
        Some(_) => Err(Error::validation(format!("Field {} must be an object", key))),
    }
}
