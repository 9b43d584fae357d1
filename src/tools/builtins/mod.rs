//! Built-in tool catalog.

mod events;
mod logs;
mod node;
mod sample;

use super::ToolRegistry;
use crate::types::ToolsConfig;

/// Register every built-in tool, then apply the allow-list.
///
/// Tools that change node state are skipped when `read_only` is set.
pub fn build_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, config.read_only);
    registry.filter(&config.allowed_tools);

    tracing::debug!(tools = registry.len(), read_only = config.read_only, "tool registry built");
    registry
}

pub fn register_builtin_tools(registry: &mut ToolRegistry, read_only: bool) {
    node::register(registry);
    events::register(registry);
    logs::register(registry);
    sample::register(registry);
    if !read_only {
        events::register_actions(registry);
        logs::register_actions(registry);
    }
}
