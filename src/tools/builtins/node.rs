//! Node and cluster introspection tools.

use crate::tools::registry::{handler_fn, schema_for, ToolContext, ToolDefinition, ToolRegistry};
use crate::tools::ToolResult;
use crate::types::Result;
use crate::validation::parse_params;
use chrono::{DateTime, Utc};
use humantime_serde::re::humantime::format_duration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize, JsonSchema)]
struct NoParams {}

#[derive(Debug, Serialize)]
struct NodeInfo {
    name: String,
    started_at: DateTime<Utc>,
    uptime: String,
    tools: usize,
    samplers: usize,
    events: usize,
    loggers: usize,
    log_messages: u64,
}

#[derive(Debug, Serialize)]
struct ClusterNodes {
    local: String,
    peers: Vec<String>,
}

pub(super) fn register(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "node_info",
        "Returns node information: name, start time, uptime, and counts of tools, samplers, events and loggers.",
        schema_for::<NoParams>(),
        handler_fn(node_info),
    ));
    registry.register(ToolDefinition::new(
        "node_env",
        "Returns the node environment variables as key-value pairs.",
        schema_for::<NoParams>(),
        handler_fn(node_env),
    ));
    registry.register(ToolDefinition::new(
        "cluster_nodes",
        "Returns the local node name and the peers the cluster proxy can reach. Pass one of the peers as \"node\" to any tool to run it there.",
        schema_for::<NoParams>(),
        handler_fn(cluster_nodes),
    ));
}

async fn node_info(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let NoParams {} = parse_params(params)?;
    let node = ctx.node();
    let info = NodeInfo {
        name: node.name().to_string(),
        started_at: node.started_at(),
        uptime: format_duration(Duration::from_secs(node.uptime().as_secs())).to_string(),
        tools: ctx.dispatcher().registry().len(),
        samplers: node.samplers().len().await,
        events: node.events().len().await,
        loggers: node.logs().loggers().len(),
        log_messages: node.logs().published(),
    };
    Ok(ToolResult::json(&info))
}

async fn node_env(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let NoParams {} = parse_params(params)?;
    Ok(ToolResult::json(&ctx.node().env()))
}

async fn cluster_nodes(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let NoParams {} = parse_params(params)?;
    let peers = ctx.dispatcher().transport().peers().await;
    Ok(ToolResult::json(&ClusterNodes {
        local: ctx.node().name().to_string(),
        peers: peers.iter().map(|p| p.to_string()).collect(),
    }))
}
