//! node-probe server - main entry point.
//!
//! Starts the IPC server for one node:
//! - mcp service: tool discovery and invocation for clients
//! - cluster service: tool call envelopes from peer proxies

use clap::Parser;
use node_probe::bus::{LogBus, LogBusLayer, LogLevel};
use node_probe::cluster::IpcTransport;
use node_probe::ipc::IpcServer;
use node_probe::tools::build_registry;
use node_probe::types::NodeName;
use node_probe::{Config, Dispatcher, Node};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON)
    #[arg(short, long, env = "NODE_PROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Node name, e.g. alpha@localhost (overrides config file)
    #[arg(long, env = "NODE_PROBE_NODE")]
    node: Option<String>,

    /// IPC listen address (overrides config file)
    #[arg(long, env = "NODE_PROBE_LISTEN")]
    listen: Option<String>,

    /// Peer as name=addr, repeatable
    #[arg(long = "peer", value_parser = parse_peer)]
    peers: Vec<(String, String)>,

    /// Only expose these tools (comma-separated)
    #[arg(long, value_delimiter = ',', env = "NODE_PROBE_ALLOWED_TOOLS")]
    allowed_tools: Vec<String>,

    /// Skip tools that change node state
    #[arg(long, env = "NODE_PROBE_READ_ONLY")]
    read_only: bool,
}

fn parse_peer(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, addr)| !name.is_empty() && !addr.is_empty())
        .map(|(name, addr)| (name.to_string(), addr.to_string()))
        .ok_or_else(|| format!("expected name=addr, got {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(node) = args.node {
        config.node.name = node;
    }
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    config.proxy.peers.extend(args.peers);
    if !args.allowed_tools.is_empty() {
        config.tools.allowed_tools = args.allowed_tools;
    }
    if args.read_only {
        config.tools.read_only = true;
    }

    let name = NodeName::from_string(config.node.name.clone())?;

    // The node's own tracing events feed its log bus.
    let logs = LogBus::new();
    node_probe::observability::init_tracing(
        &config.observability.log_level,
        config.observability.json_logs,
        Some(LogBusLayer::new(logs.clone(), name.clone())),
    );

    if let Some(level) = LogLevel::parse(&config.observability.log_level) {
        logs.set_level(Some(level));
    }

    let node = Node::with_log_bus(name, config.sampler.clone(), logs);
    for (key, value) in &config.node.env {
        node.set_env(key.as_str(), value.as_str());
    }
    let registry = Arc::new(build_registry(&config.tools));
    let transport = Arc::new(IpcTransport::from_config(
        &config.proxy.peers,
        config.ipc.max_frame_bytes,
    ));
    let dispatcher = Dispatcher::new(node, registry, transport, config.proxy.call_timeout);

    let addr = config.server.listen_addr.parse()?;
    let server = IpcServer::new(dispatcher.clone(), addr, config.ipc.clone());

    tracing::info!(
        node = %dispatcher.node().name(),
        %addr,
        tools = dispatcher.registry().len(),
        peers = config.proxy.peers.len(),
        "node-probe starting"
    );

    let shutdown = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            shutdown.cancel();
        }
    });

    server.serve().await?;
    Ok(())
}
