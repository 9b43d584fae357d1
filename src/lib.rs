//! # Node Probe - Introspection Tools, Cluster Proxy and Samplers
//!
//! Rust implementation of a per-node inspection service providing:
//! - A tool registry where every tool accepts an optional `node` parameter
//! - A cluster proxy forwarding calls to peers as opaque envelopes
//! - Background samplers (active polling or passive log/event capture)
//!   collecting into bounded ring buffers
//! - A TCP+msgpack IPC edge for clients and peer proxies
//!
//! ## Architecture
//!
//! Every invocation enters through the [`Dispatcher`]; samplers call tools
//! through the same path, so a sampler can watch a remote node:
//! ```text
//!                    ┌──────────────────────────────────────┐
//!   IPC mcp.* ────►  │             Dispatcher               │
//!                    │  node == "" / self ──► ToolRegistry  │
//!   IPC cluster ──►  │  node == peer ──► ClusterTransport ──┼──► peer
//!                    └──────────────▲───────────────────────┘
//!                                   │ tick
//!                    ┌──────────────┴───────────────────────┐
//!                    │  SamplerManager ─► Sampler tasks     │
//!                    │     LogBus / EventBus ─► RingBuffer  │
//!                    └──────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod bus;
pub mod cluster;
pub mod dispatch;
pub mod ipc;
pub mod node;
pub mod sampler;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

#[cfg(test)]
mod testing;

pub use dispatch::Dispatcher;
pub use node::Node;
pub use types::{Config, Error, Result};
