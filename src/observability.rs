//! Observability utilities.

use crate::bus::LogBusLayer;
use std::sync::OnceLock;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::{fmt, prelude::*};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Env var switching the fmt layer to JSON (`NODE_PROBE_LOG_FORMAT=json`).
pub const LOG_FORMAT_ENV: &str = "NODE_PROBE_LOG_FORMAT";

/// Target prefix of the events republished on the log bus.
const BUS_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Initialize tracing subscriber once for the process.
///
/// `RUST_LOG` wins over `default_level`. JSON output is enabled by `json` or
/// by [`LOG_FORMAT_ENV`]. When `log_bus` is given, the node's own events are
/// also republished to it so passive samplers can capture them.
///
/// The env filter applies to console output only. The bus layer sees every
/// event of this crate and leaves level selection to the bus's node level.
pub fn init_tracing(default_level: &str, json: bool, log_bus: Option<LogBusLayer>) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = env_filter(default_level, std::env::var("RUST_LOG").ok().as_deref());
        let json = use_json(json, std::env::var(LOG_FORMAT_ENV).ok().as_deref());
        let log_bus = log_bus.map(|layer| {
            layer.with_filter(filter_fn(|meta| meta.target().starts_with(BUS_TARGET)))
        });

        let result = if json {
            tracing_subscriber::registry()
                .with(log_bus)
                .with(fmt::layer().json().with_filter(env_filter))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(log_bus)
                .with(fmt::layer().compact().with_filter(env_filter))
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

/// Console filter: `from_env` when it parses, else `default_level`, else `info`.
fn env_filter(default_level: &str, from_env: Option<&str>) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(default_level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn use_json(requested: bool, format_env: Option<&str>) -> bool {
    requested || format_env.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}
