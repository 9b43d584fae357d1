//! Shared fixtures for unit tests.

use crate::cluster::Mesh;
use crate::dispatch::Dispatcher;
use crate::node::Node;
use crate::tools::ToolRegistry;
use crate::types::{NodeName, SamplerLimits};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn node(name: &str) -> Node {
    Node::new(
        NodeName::from_string(name.to_string()).expect("node name"),
        SamplerLimits::default(),
    )
}

/// Dispatcher with no reachable peers.
pub(crate) fn local_dispatcher(name: &str, registry: ToolRegistry) -> Arc<Dispatcher> {
    let node = node(name);
    let transport = Mesh::new().transport(node.name().clone());
    Dispatcher::new(
        node,
        Arc::new(registry),
        Arc::new(transport),
        Duration::from_secs(30),
    )
}
