//! IPC service handlers — one module per service.

pub mod cluster;
pub mod mcp;
