//! Sampler tools: start, listen, read, stop, list.

use crate::bus::{EventRef, LogLevel, LogSourceKind};
use crate::sampler::{ActiveSpec, PassiveSpec, SamplerConfig, SamplerMode, SamplerSource};
use crate::tools::registry::{handler_fn, schema_for, ToolContext, ToolDefinition, ToolRegistry};
use crate::tools::ToolResult;
use crate::types::{Error, NodeName, Result, SamplerId, SamplerLimits};
use crate::validation::{parse_params, validate_non_empty};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Deserialize, JsonSchema)]
struct SampleStartParams {
    /// Tool name to call periodically (e.g. node_info, event_list, loggers_list)
    tool: String,
    /// Arguments passed to the tool on each call (e.g. {"name": "orders"}). A "node" member samples that peer
    arguments: Option<Map<String, Value>>,
    /// Collection interval in ms (default: 5000, min: 100)
    interval_ms: Option<u64>,
    /// Number of samples to collect (0 = until stopped)
    count: Option<u64>,
    /// Run for N seconds then stop (default: 60, max: 3600, 0 = until stopped)
    duration_sec: Option<u64>,
    /// Ring buffer size (default: 256, max: 65536). Oldest entries overwritten when full
    buffer_size: Option<usize>,
    /// Stop after N consecutive tool errors (default: 0 = ignore errors, keep retrying)
    max_errors: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SampleListenParams {
    /// Log levels to capture (trace, debug, info, warning, error, panic). Default: [info, warning, error, panic]
    log_levels: Option<Vec<String>>,
    /// Filter logs by source (process, meta, node, network). Empty = all sources
    log_source: Option<String>,
    /// Event name to subscribe to. Omit to disable event capture
    event: Option<String>,
    /// Node that owns the event (default: local node)
    event_node: Option<String>,
    /// Run for N seconds then stop (default: 60, max: 3600, 0 = until stopped)
    duration_sec: Option<u64>,
    /// Ring buffer size (default: 256, max: 65536). Oldest entries overwritten when full
    buffer_size: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SampleReadParams {
    /// Sampler ID returned from sample_start or sample_listen
    sampler_id: String,
    /// Return entries with sequence > since. Omit to get every buffered entry
    since: Option<u64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SampleStopParams {
    /// Sampler ID returned from sample_start or sample_listen
    sampler_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoParams {}

#[derive(Debug, Serialize)]
struct ActiveStarted {
    sampler_id: SamplerId,
    mode: SamplerMode,
    tool: String,
    interval_ms: u64,
    count: u64,
    duration_sec: u64,
    buffer_size: usize,
}

#[derive(Debug, Serialize)]
struct PassiveStarted {
    sampler_id: SamplerId,
    mode: SamplerMode,
    duration_sec: u64,
    buffer_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_levels: Option<Vec<LogLevel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_source: Option<LogSourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<String>,
}

pub(super) fn register(registry: &mut ToolRegistry) {
    registry.register(ToolDefinition::new(
        "sample_start",
        "Start an active sampler that periodically calls any tool and stores results in a ring buffer. Read results with sample_read. Use this to watch any metric over time: node_info for node health, event_list for event traffic, etc.",
        schema_for::<SampleStartParams>(),
        handler_fn(sample_start),
    ));
    registry.register(ToolDefinition::new(
        "sample_listen",
        "Start a passive sampler that captures log messages and/or event publications into a ring buffer. Read results with sample_read. Log and event capture can be combined in one sampler.",
        schema_for::<SampleListenParams>(),
        handler_fn(sample_listen),
    ));
    registry.register(ToolDefinition::new(
        "sample_read",
        "Read collected samples from a running or completed sampler. Pass the returned sequence of the last entry as since on the next call to get only new entries.",
        schema_for::<SampleReadParams>(),
        handler_fn(sample_read),
    ));
    registry.register(ToolDefinition::new(
        "sample_stop",
        "Stop a running sampler. Remaining data can still be read via sample_read after stopping.",
        schema_for::<SampleStopParams>(),
        handler_fn(sample_stop),
    ));
    registry.register(ToolDefinition::new(
        "sample_list",
        "List all samplers on this node with their configuration, status and progress.",
        schema_for::<NoParams>(),
        handler_fn(sample_list),
    ));
}

fn resolve_interval(requested: Option<u64>, limits: &SamplerLimits) -> u64 {
    match requested {
        Some(ms) if ms >= limits.min_interval_ms => ms,
        _ => limits.default_interval_ms,
    }
}

/// Omitted → default, 0 → unbounded, otherwise capped.
fn resolve_duration(requested: Option<u64>, limits: &SamplerLimits) -> u64 {
    match requested {
        None => limits.default_duration_sec,
        Some(secs) => secs.min(limits.max_duration_sec),
    }
}

/// Omitted or 0 → default, otherwise capped.
fn resolve_buffer(requested: Option<usize>, limits: &SamplerLimits) -> usize {
    requested
        .filter(|size| *size > 0)
        .unwrap_or(limits.default_buffer_size)
        .min(limits.max_buffer_size)
}

fn parse_levels(names: &[String]) -> Result<Vec<LogLevel>> {
    let mut levels = Vec::with_capacity(names.len());
    for name in names {
        let level = LogLevel::parse(name)
            .ok_or_else(|| Error::invalid_params(format!("unknown log level: {}", name)))?;
        if !levels.contains(&level) {
            levels.push(level);
        }
    }
    Ok(levels)
}

fn parse_sampler_id(raw: String) -> Result<SamplerId> {
    SamplerId::from_string(raw).map_err(|_| Error::invalid_params("sampler_id is required"))
}

async fn sample_start(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: SampleStartParams = parse_params(params)?;
    validate_non_empty(&p.tool, "tool")?;

    let node = ctx.node();
    let limits = node.limits();
    let interval_ms = resolve_interval(p.interval_ms, limits);
    let duration_sec = resolve_duration(p.duration_sec, limits);
    let buffer_size = resolve_buffer(p.buffer_size, limits);
    let count = p.count.unwrap_or(0);

    let config = SamplerConfig {
        id: SamplerId::generate(),
        owner: node.name().clone(),
        duration: Duration::from_secs(duration_sec),
        buffer_size,
        source: SamplerSource::Active(ActiveSpec {
            tool: p.tool.clone(),
            arguments: Value::Object(p.arguments.unwrap_or_default()),
            interval: Duration::from_millis(interval_ms),
            count,
            max_errors: p.max_errors.unwrap_or(0),
        }),
    };

    let sampler_id = node.samplers().start(ctx.dispatcher(), config).await?;

    Ok(ToolResult::json(&ActiveStarted {
        sampler_id,
        mode: SamplerMode::Active,
        tool: p.tool,
        interval_ms,
        count,
        duration_sec,
        buffer_size,
    }))
}

async fn sample_listen(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: SampleListenParams = parse_params(params)?;

    let node = ctx.node();
    let limits = node.limits();
    let duration_sec = resolve_duration(p.duration_sec, limits);
    let buffer_size = resolve_buffer(p.buffer_size, limits);

    let requested_levels = p.log_levels.unwrap_or_default();
    let event_name = p.event.filter(|e| !e.is_empty());
    let has_log = !requested_levels.is_empty() || event_name.is_none();

    let log_levels = if !has_log {
        Vec::new()
    } else if requested_levels.is_empty() {
        LogLevel::defaults()
    } else {
        parse_levels(&requested_levels)?
    };

    let log_source = match p.log_source.as_deref() {
        None | Some("") => None,
        Some(kind) => Some(LogSourceKind::parse(kind).ok_or_else(|| {
            Error::invalid_params(format!(
                "unknown log source: {} (expected process, meta, node or network)",
                kind
            ))
        })?),
    };

    let event = match event_name {
        Some(name) => {
            let owner = match p.event_node.as_deref() {
                None | Some("") => node.name().clone(),
                Some(other) => NodeName::from_string(other.to_string())
                    .map_err(|e| Error::invalid_params(e.to_string()))?,
            };
            Some(EventRef { name, node: owner })
        }
        None => None,
    };

    let config = SamplerConfig {
        id: SamplerId::generate(),
        owner: node.name().clone(),
        duration: Duration::from_secs(duration_sec),
        buffer_size,
        source: SamplerSource::Passive(PassiveSpec {
            log_levels: log_levels.clone(),
            log_source: if has_log { log_source } else { None },
            event: event.clone(),
        }),
    };

    let sampler_id = node.samplers().start(ctx.dispatcher(), config).await?;

    Ok(ToolResult::json(&PassiveStarted {
        sampler_id,
        mode: SamplerMode::Passive,
        duration_sec,
        buffer_size,
        log_levels: has_log.then_some(log_levels),
        log_source: if has_log { log_source } else { None },
        event: event.map(|e| e.to_string()),
    }))
}

async fn sample_read(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: SampleReadParams = parse_params(params)?;
    let id = parse_sampler_id(p.sampler_id)?;

    let response = ctx.node().samplers().read(&id, p.since).await?;
    Ok(ToolResult::json(&response))
}

async fn sample_stop(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let p: SampleStopParams = parse_params(params)?;
    let id = parse_sampler_id(p.sampler_id)?;

    ctx.node().samplers().stop(&id).await?;
    Ok(ToolResult::text(format!("sampler {} stopping", id)))
}

async fn sample_list(ctx: ToolContext, params: Value) -> Result<ToolResult> {
    let NoParams {} = parse_params(params)?;
    Ok(ToolResult::json(&ctx.node().samplers().list().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::tools::builtins::register_builtin_tools;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dispatcher() -> std::sync::Arc<crate::dispatch::Dispatcher> {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, false);
        testing::local_dispatcher("alpha@localhost", registry)
    }

    fn parse(result: &ToolResult) -> Value {
        serde_json::from_str(&result.text_content()).unwrap()
    }

    #[test]
    fn test_parameter_defaults_and_limits() {
        let limits = SamplerLimits::default();
        assert_eq!(resolve_interval(None, &limits), 5_000);
        assert_eq!(resolve_interval(Some(50), &limits), 5_000);
        assert_eq!(resolve_interval(Some(100), &limits), 100);

        assert_eq!(resolve_duration(None, &limits), 60);
        assert_eq!(resolve_duration(Some(0), &limits), 0);
        assert_eq!(resolve_duration(Some(7_200), &limits), 3_600);

        assert_eq!(resolve_buffer(None, &limits), 256);
        assert_eq!(resolve_buffer(Some(0), &limits), 256);
        assert_eq!(resolve_buffer(Some(8), &limits), 8);
        assert_eq!(resolve_buffer(Some(usize::MAX), &limits), 65_536);
    }

    #[tokio::test]
    async fn test_oversized_buffer_is_capped() {
        let dispatcher = dispatcher();

        let started = parse(
            &dispatcher
                .call(
                    "sample_start",
                    json!({"tool": "node_info", "buffer_size": u64::MAX, "interval_ms": 60_000}),
                )
                .await
                .unwrap(),
        );
        assert_eq!(started["buffer_size"], 65_536);
        let id = started["sampler_id"].as_str().unwrap().to_string();

        let samplers = dispatcher.node().samplers();
        assert_eq!(samplers.len().await, 1);
        let listed = parse(&dispatcher.call("sample_list", json!({})).await.unwrap());
        assert_eq!(listed[0]["id"], id.as_str());
        assert!(listed[0]["samples"]
            .as_str()
            .unwrap()
            .ends_with("/65536"));

        dispatcher
            .call("sample_stop", json!({"sampler_id": id}))
            .await
            .unwrap();
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        assert_eq!(
            parse_levels(&["error".to_string(), "Warning".to_string(), "error".to_string()]).unwrap(),
            vec![LogLevel::Error, LogLevel::Warning]
        );
        assert!(parse_levels(&["verbose".to_string()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_read_stop_round_trip() {
        let dispatcher = dispatcher();

        let started = parse(
            &dispatcher
                .call(
                    "sample_start",
                    json!({"tool": "node_info", "interval_ms": 100, "count": 2}),
                )
                .await
                .unwrap(),
        );
        assert_eq!(started["mode"], "active");
        assert_eq!(started["tool"], "node_info");
        assert_eq!(started["duration_sec"], 60);
        assert_eq!(started["buffer_size"], 256);
        let id = started["sampler_id"].as_str().unwrap().to_string();
        assert!(id.starts_with("sampler_"));

        tokio::time::sleep(Duration::from_millis(250)).await;

        let read = parse(
            &dispatcher
                .call("sample_read", json!({"sampler_id": id}))
                .await
                .unwrap(),
        );
        assert_eq!(read["completed"], true);
        assert_eq!(read["sequence"], 2);
        assert_eq!(read["samples"].as_array().unwrap().len(), 2);
        // each sample holds the tool result
        let first = &read["samples"][0]["data"]["content"][0]["text"];
        let info: Value = serde_json::from_str(first.as_str().unwrap()).unwrap();
        assert_eq!(info["name"], "alpha@localhost");

        let listed = parse(&dispatcher.call("sample_list", json!({})).await.unwrap());
        assert_eq!(listed[0]["status"], "completed");
        assert_eq!(listed[0]["progress"], "2/2 samples");
        assert_eq!(listed[0]["description"], "node_info every 100ms");

        let stopped = dispatcher
            .call("sample_stop", json!({"sampler_id": id}))
            .await
            .unwrap();
        assert_eq!(stopped.text_content(), format!("sampler {} stopping", id));
    }

    #[tokio::test]
    async fn test_listen_defaults_to_log_capture() {
        let dispatcher = dispatcher();

        let started = parse(&dispatcher.call("sample_listen", json!({})).await.unwrap());
        assert_eq!(started["mode"], "passive");
        assert_eq!(
            started["log_levels"],
            json!(["info", "warning", "error", "panic"])
        );
        assert!(started.get("event").is_none());
        let id = started["sampler_id"].as_str().unwrap().to_string();

        dispatcher
            .call("log_write", json!({"level": "error", "message": "disk failure"}))
            .await
            .unwrap();
        dispatcher
            .call("log_write", json!({"level": "debug", "message": "ignored"}))
            .await
            .unwrap();

        let read = parse(
            &dispatcher
                .call("sample_read", json!({"sampler_id": id}))
                .await
                .unwrap(),
        );
        let samples = read["samples"].as_array().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0]["data"]["message"], "disk failure");
        assert_eq!(samples[0]["data"]["type"], "node");
        assert_eq!(read["mode"], "passive");
        assert!(read.get("tool").is_none());
    }

    #[tokio::test]
    async fn test_listen_event_only() {
        let dispatcher = dispatcher();
        dispatcher
            .call("event_register", json!({"name": "orders"}))
            .await
            .unwrap();

        let started = parse(
            &dispatcher
                .call("sample_listen", json!({"event": "orders"}))
                .await
                .unwrap(),
        );
        assert_eq!(started["event"], "orders@alpha@localhost");
        assert!(started.get("log_levels").is_none());

        // event-only sampler registers no logger
        let loggers = parse(&dispatcher.call("loggers_list", json!({})).await.unwrap());
        assert_eq!(loggers, json!([]));
    }

    #[tokio::test]
    async fn test_listen_on_unknown_event_fails() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .call("sample_listen", json!({"event": "ghost", "log_levels": ["info"]}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot monitor event"));

        let listed = parse(&dispatcher.call("sample_list", json!({})).await.unwrap());
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn test_read_unknown_sampler() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .call("sample_read", json!({"sampler_id": "sampler_00000000"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = dispatcher
            .call("sample_stop", json!({"sampler_id": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }
}
