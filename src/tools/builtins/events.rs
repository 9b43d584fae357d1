//! Event tools.

use crate::bus::EventInfo;
use crate::tools::registry::{handler_fn, schema_for, ToolContext, ToolDefinition, ToolRegistry};
use crate::tools::ToolResult;
use crate::types::{Error, Result};
use crate::validation::{parse_params, validate_non_empty};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize, JsonSchema)]
struct EventListParams {
    /// Only events whose name contains this substring
    name: Option<String>,
    /// Only events with at least this many subscribers
    min_subscribers: Option<usize>,
    /// Maximum number of events to return (default: 100)
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EventNameParams {
    /// Event name
    name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EventPublishParams {
    /// Registered event name
    name: String,
    /// Message payload delivered to subscribers
    #[serde(default)]
    message: Value,
}

pub(super) fn register(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "event_list",
        "Returns registered events with statistics (name, owning node, subscribers, messages published and delivered). Supports filtering by name substring and minimum subscriber count.",
        schema_for::<EventListParams>(),
        handler_fn(event_list),
    ));
    registry.register(ToolDefinition::new(
        "event_info",
        "Returns detailed information about a specific registered event.",
        schema_for::<EventNameParams>(),
        handler_fn(event_info),
    ));
}

pub(super) fn register_actions(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "event_register",
        "Register a new event on this node so it can be published to and listened on with sample_listen.",
        schema_for::<EventNameParams>(),
        handler_fn(event_register),
    ));
    registry.register(ToolDefinition::new(
        "event_publish",
        "Publish a message to every subscriber of a registered event.",
        schema_for::<EventPublishParams>(),
        handler_fn(event_publish),
    ));
}

async fn event_list(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: EventListParams = parse_params(params)?;
    let limit = p.limit.filter(|l| *l > 0).unwrap_or(100);

    let events: Vec<EventInfo> = ctx
        .node()
        .events()
        .list()
        .await
        .into_iter()
        .filter(|e| p.name.as_deref().map_or(true, |n| e.name.contains(n)))
        .filter(|e| e.subscribers >= p.min_subscribers.unwrap_or(0))
        .take(limit)
        .collect();

    Ok(ToolResult::json(&events))
}

async fn event_info(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: EventNameParams = parse_params(params)?;
    validate_non_empty(&p.name, "name")?;

    let info = ctx
        .node()
        .events()
        .info(&p.name)
        .await
        .ok_or_else(|| Error::not_found(format!("event {} not found", p.name)))?;
    Ok(ToolResult::json(&info))
}

async fn event_register(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: EventNameParams = parse_params(params)?;
    validate_non_empty(&p.name, "name")?;

    let event = ctx.node().events().register(&p.name).await?;
    Ok(ToolResult::json(&json!({ "event": event.to_string() })))
}

async fn event_publish(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: EventPublishParams = parse_params(params)?;
    validate_non_empty(&p.name, "name")?;

    let delivered = ctx.node().events().publish(&p.name, p.message).await?;
    Ok(ToolResult::json(&json!({ "delivered": delivered })))
}
