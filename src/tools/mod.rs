//! Tool infrastructure — registry, results, built-in catalog.
//!
//! Every tool is a named async handler with a JSON schema. The registry
//! injects the optional `node` parameter into each schema so any tool can be
//! routed to a peer by the [`Dispatcher`](crate::dispatch::Dispatcher).

pub mod builtins;
pub mod registry;
pub mod result;

pub use builtins::{build_registry, register_builtin_tools};
pub use registry::{
    handler_fn, inject_node_param, schema_for, ToolContext, ToolDefinition, ToolHandler,
    ToolRegistry, NODE_PARAM,
};
pub use result::{ContentItem, ToolResult};
