//! Core types for node-probe.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (NodeName, SamplerId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the node, proxy and samplers

mod config;
mod errors;
mod ids;

pub use config::{
    Config, IpcConfig, NodeConfig, ObservabilityConfig, ProxyConfig, SamplerLimits,
    ServerConfig, ToolsConfig,
};
pub use errors::{Error, Result};
pub use ids::{NodeName, SamplerId, SAMPLER_ID_PREFIX};
