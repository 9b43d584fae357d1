//! Tool registry — catalog, allow-list filtering, name-based dispatch.
//!
//! Built once at startup: register everything, apply the allow-list, then
//! share behind an `Arc`. After that the registry is read-only and safe to
//! dispatch against from any number of tasks.

use super::result::ToolResult;
use crate::dispatch::Dispatcher;
use crate::node::Node;
use crate::types::{Error, Result};
use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Name of the schema property that routes a call to a peer.
pub const NODE_PARAM: &str = "node";

const NODE_PARAM_DESCRIPTION: &str =
    "Remote node name for cluster proxy (e.g. 'backend@host'). Omit for local node";

// =============================================================================
// Handler contract
// =============================================================================

/// Per-call context handed to tool handlers.
#[derive(Clone)]
pub struct ToolContext {
    dispatcher: Arc<Dispatcher>,
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("node", self.dispatcher.node().name())
            .finish()
    }
}

impl ToolContext {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn node(&self) -> &Node {
        self.dispatcher.node()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

/// A tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: ToolContext, params: Value) -> Result<ToolResult>;
}

struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    async fn call(&self, ctx: ToolContext, params: Value) -> Result<ToolResult> {
        (self.0)(ctx, params).await
    }
}

/// Wrap an async function as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    Arc::new(FnTool(f))
}

// =============================================================================
// Definitions
// =============================================================================

/// A registered tool as advertised by `tools/list`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(skip, default = "missing_handler")]
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

struct MissingHandler;

#[async_trait]
impl ToolHandler for MissingHandler {
    async fn call(&self, _ctx: ToolContext, _params: Value) -> Result<ToolResult> {
        Err(Error::internal("tool definition has no handler"))
    }
}

fn missing_handler() -> Arc<dyn ToolHandler> {
    Arc::new(MissingHandler)
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }
}

/// Input schema generated from a parameter struct.
///
/// Doc comments on fields become property descriptions. An object schema
/// always carries a `properties` member so the node parameter can be added.
pub fn schema_for<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.option_add_null_type = false;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root).unwrap_or_else(|_| json!({"type": "object"}));

    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    schema
}

/// Add the optional `node` routing property to `properties`.
///
/// Schemas without an object `properties` member, or that already declare
/// `node`, are returned unchanged.
pub fn inject_node_param(mut schema: Value) -> Value {
    if let Some(props) = schema
        .get_mut("properties")
        .and_then(|p| p.as_object_mut())
    {
        if !props.contains_key(NODE_PARAM) {
            props.insert(
                NODE_PARAM.to_string(),
                json!({
                    "type": "string",
                    "description": NODE_PARAM_DESCRIPTION,
                }),
            );
        }
    }
    schema
}

// =============================================================================
// Registry
// =============================================================================

/// Tool catalog with a name → handler dispatch index.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, Arc<dyn ToolHandler>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Its schema gains the `node` routing property.
    ///
    /// Names are expected to be unique; registering a name twice leaves
    /// both definitions listed but only the later handler reachable.
    pub fn register(&mut self, mut def: ToolDefinition) {
        def.input_schema = inject_node_param(def.input_schema);
        self.index.insert(def.name.clone(), def.handler.clone());
        self.tools.push(def);
    }

    /// Keep only the named tools. An empty list keeps everything.
    pub fn filter(&mut self, allowed: &[String]) {
        if allowed.is_empty() {
            return;
        }
        let keep: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        self.tools.retain(|def| keep.contains(def.name.as_str()));
        self.index.retain(|name, _| keep.contains(name.as_str()));

        tracing::info!(tools = ?self.names(), "tool allow-list applied");
    }

    /// Tools in registration order.
    pub fn list(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|def| def.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|def| def.name.as_str()).collect()
    }

    /// Invoke a tool by name. The handler's outcome is returned unchanged.
    pub async fn dispatch(&self, ctx: &ToolContext, name: &str, args: Value) -> Result<ToolResult> {
        let handler = self
            .index
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_tool(name))?;
        handler.call(ctx.clone(), args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct EchoParams {
        /// Text to echo back.
        text: String,
        /// Repeat count.
        times: Option<u32>,
    }

    fn echo_def(name: &str) -> ToolDefinition {
        ToolDefinition::new(
            name,
            "echo arguments",
            schema_for::<EchoParams>(),
            handler_fn(|_ctx, params| async move { Ok(ToolResult::text(params.to_string())) }),
        )
    }

    #[test]
    fn test_schema_for_lists_properties_and_required() {
        let schema = schema_for::<EchoParams>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["text"]["description"], "Text to echo back.");
        assert_eq!(schema["required"], json!(["text"]));
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_register_injects_node_param() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_def("echo"));

        let schema = &registry.get("echo").unwrap().input_schema;
        assert_eq!(schema["properties"]["node"]["type"], "string");
        assert_eq!(
            schema["properties"]["node"]["description"],
            NODE_PARAM_DESCRIPTION
        );
        // still optional
        assert_eq!(schema["required"], json!(["text"]));
    }

    #[test]
    fn test_existing_node_property_untouched() {
        let schema = json!({
            "type": "object",
            "properties": {
                "node": {"type": "string", "description": "Node to inspect"}
            },
            "required": ["node"]
        });
        assert_eq!(inject_node_param(schema.clone()), schema);
    }

    #[test]
    fn test_schema_without_properties_untouched() {
        let schema = json!({"type": "object"});
        assert_eq!(inject_node_param(schema.clone()), schema);

        let schema = json!({"type": "object", "properties": "bogus"});
        assert_eq!(inject_node_param(schema.clone()), schema);
    }

    #[test]
    fn test_injection_is_idempotent() {
        let once = inject_node_param(schema_for::<EchoParams>());
        let twice = inject_node_param(once.clone());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_filter_removes_from_listing_and_dispatch() {
        let mut registry = ToolRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(echo_def(name));
        }
        registry.filter(&["a".to_string(), "b".to_string()]);
        assert_eq!(registry.names(), vec!["a", "b"]);

        let dispatcher = testing::local_dispatcher("alpha@localhost", registry);
        let ctx = ToolContext::new(dispatcher.clone());
        let registry = dispatcher.registry();

        assert!(registry.dispatch(&ctx, "a", json!({"text": "hi"})).await.is_ok());
        let err = registry.dispatch(&ctx, "c", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(name) if name == "c"));
    }

    #[test]
    fn test_empty_allow_list_is_noop() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_def("a"));
        registry.register(echo_def("b"));
        registry.filter(&[]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_definition_serializes_without_handler() {
        let value = serde_json::to_value(echo_def("echo")).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert!(value.get("inputSchema").is_some());
    }
}
