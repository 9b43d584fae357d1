//! Configuration structures.
//!
//! Configuration is loaded from a JSON file (every section optional) and
//! overridden by command-line flags / environment variables in the binary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::{Error, Result};

/// Global node configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node identity.
    #[serde(default)]
    pub node: NodeConfig,

    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Tool catalog configuration.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Cluster proxy configuration.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Sampler defaults and limits.
    #[serde(default)]
    pub sampler: SamplerLimits,

    /// IPC transport configuration.
    #[serde(default)]
    pub ipc: IpcConfig,
}

impl Config {
    /// Load configuration from a JSON file. Missing sections use defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        if config.node.name.is_empty() {
            return Err(Error::validation("node.name cannot be empty"));
        }
        Ok(config)
    }
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cluster-unique node name, e.g. `alpha@localhost`.
    pub name: String,

    /// Node environment, reported by `node_env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "probe@localhost".to_string(),
            env: BTreeMap::new(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IPC server bind address (TCP).
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9922".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Tool catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Allow-list of tool names. Empty = every registered tool.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Skip registration of tools that change node state.
    #[serde(default)]
    pub read_only: bool,
}

/// Cluster proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Default timeout for a forwarded tool call.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Known peers: node name → IPC address.
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            peers: BTreeMap::new(),
        }
    }
}

/// Sampler defaults and limits applied by `sample_start` / `sample_listen`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerLimits {
    /// Interval used when none (or one below the minimum) is requested.
    pub default_interval_ms: u64,

    /// Smallest accepted interval.
    pub min_interval_ms: u64,

    /// Duration used when the caller omits one. An explicit 0 runs until
    /// stopped.
    pub default_duration_sec: u64,

    /// Duration cap.
    pub max_duration_sec: u64,

    /// Ring buffer capacity used when none is requested.
    pub default_buffer_size: usize,

    /// Largest ring buffer capacity a caller may request.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    /// How long `sample_read` waits for a sampler to answer.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// How long a completed sampler keeps answering reads before it exits.
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl Default for SamplerLimits {
    fn default() -> Self {
        Self {
            default_interval_ms: 5_000,
            min_interval_ms: 100,
            default_duration_sec: 60,
            max_duration_sec: 3_600,
            default_buffer_size: 256,
            max_buffer_size: default_max_buffer_size(),
            read_timeout: Duration::from_secs(5),
            retention: Duration::from_secs(300),
        }
    }
}

fn default_max_buffer_size() -> usize {
    65_536
}

/// IPC transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Maximum frame payload size in bytes.
    pub max_frame_bytes: u32,

    /// Maximum concurrent TCP connections. Connections beyond this limit
    /// are rejected.
    pub max_connections: usize,

    /// Read timeout in seconds per frame. Connections idle beyond this
    /// duration are dropped.
    pub read_timeout_secs: u64,

    /// Write timeout in seconds per frame.
    pub write_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 5 * 1024 * 1024,
            max_connections: 1000,
            read_timeout_secs: 30,
            write_timeout_secs: 10,
        }
    }
}
