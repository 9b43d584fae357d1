//! Logger tools.

use crate::bus::{LogLevel, LogMessage, LogSource};
use crate::tools::registry::{handler_fn, schema_for, ToolContext, ToolDefinition, ToolRegistry};
use crate::tools::ToolResult;
use crate::types::{Error, Result};
use crate::validation::parse_params;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize, JsonSchema)]
struct NoParams {}

#[derive(Debug, Deserialize, JsonSchema)]
struct LogLevelGetParams {
    /// Target whose level to read. Only 'node' is managed here. Default: node
    target: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LogLevelSetParams {
    /// Target whose level to change. Only 'node' is managed here. Default: node
    target: Option<String>,
    /// Log level to set (trace, debug, info, warning, error, panic, disabled)
    level: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct LogWriteParams {
    /// Log level (trace, debug, info, warning, error, panic)
    level: String,
    /// Message text
    message: String,
}

pub(super) fn register(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "loggers_list",
        "List all registered loggers with their names and configured levels. Passive samplers appear here while they capture logs.",
        schema_for::<NoParams>(),
        handler_fn(loggers_list),
    ));
    registry.register(ToolDefinition::new(
        "log_level_get",
        "Get the node log level. Messages below it are not delivered to loggers or passive samplers.",
        schema_for::<LogLevelGetParams>(),
        handler_fn(log_level_get),
    ));
}

pub(super) fn register_actions(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "log_write",
        "Write a message to the node log. Delivered to every logger registered for the level.",
        schema_for::<LogWriteParams>(),
        handler_fn(log_write),
    ));
    registry.register(ToolDefinition::new(
        "log_level_set",
        "Set the node log level. Levels: trace, debug, info, warning, error, panic, disabled. Lower it to let passive samplers capture debug or trace messages.",
        schema_for::<LogLevelSetParams>(),
        handler_fn(log_level_set),
    ));
}

/// Only the node itself carries a level.
fn check_target(target: Option<&str>) -> Result<()> {
    match target {
        None | Some("") | Some("node") => Ok(()),
        Some(other) => Err(Error::not_found(format!(
            "cannot resolve target {:?}: only the node log level is managed",
            other
        ))),
    }
}

fn level_name(level: Option<LogLevel>) -> &'static str {
    level.map_or("disabled", LogLevel::as_str)
}

async fn loggers_list(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let NoParams {} = parse_params(params)?;
    Ok(ToolResult::json(&ctx.node().logs().loggers()))
}

async fn log_level_get(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: LogLevelGetParams = parse_params(params)?;
    check_target(p.target.as_deref())?;
    Ok(ToolResult::text(format!(
        "node log level: {}",
        level_name(ctx.node().logs().level())
    )))
}

async fn log_level_set(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: LogLevelSetParams = parse_params(params)?;
    check_target(p.target.as_deref())?;
    let level = if p.level.eq_ignore_ascii_case("disabled") {
        None
    } else {
        Some(
            LogLevel::parse(&p.level)
                .ok_or_else(|| Error::invalid_params(format!("unknown log level: {}", p.level)))?,
        )
    };

    ctx.node().logs().set_level(level);
    tracing::info!(level = level_name(level), "node log level changed");
    Ok(ToolResult::text(format!(
        "node log level set to {}",
        level_name(level)
    )))
}

async fn log_write(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: LogWriteParams = parse_params(params)?;
    let level = LogLevel::parse(&p.level)
        .ok_or_else(|| Error::invalid_params(format!("unknown log level: {}", p.level)))?;

    let node = ctx.node();
    let delivered = node.logs().publish(LogMessage::new(
        level,
        p.message,
        LogSource::Node {
            node: node.name().to_string(),
        },
    ));
    Ok(ToolResult::json(&json!({ "delivered": delivered })))
}
