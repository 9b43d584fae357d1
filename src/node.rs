//! Node handle — the runtime facilities tools and samplers work against.

use crate::bus::{EventBus, LogBus};
use crate::sampler::SamplerManager;
use crate::types::{NodeName, SamplerLimits};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct NodeInner {
    name: NodeName,
    started_at: DateTime<Utc>,
    logs: LogBus,
    events: EventBus,
    samplers: SamplerManager,
    limits: SamplerLimits,
    env: RwLock<BTreeMap<String, String>>,
}

/// Cheaply cloneable handle to one node's subsystems.
#[derive(Debug, Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn new(name: NodeName, limits: SamplerLimits) -> Self {
        Self::with_log_bus(name, limits, LogBus::new())
    }

    /// Build around an existing log bus, e.g. one already wired into the
    /// tracing subscriber.
    pub fn with_log_bus(name: NodeName, limits: SamplerLimits, logs: LogBus) -> Self {
        let samplers = SamplerManager::new(limits.read_timeout, limits.retention);
        Self {
            inner: Arc::new(NodeInner {
                events: EventBus::new(name.clone()),
                name,
                started_at: Utc::now(),
                logs,
                samplers,
                limits,
                env: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &NodeName {
        &self.inner.name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.inner.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn logs(&self) -> &LogBus {
        &self.inner.logs
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn samplers(&self) -> &SamplerManager {
        &self.inner.samplers
    }

    pub fn limits(&self) -> &SamplerLimits {
        &self.inner.limits
    }

    /// Snapshot of the node environment.
    pub fn env(&self) -> BTreeMap<String, String> {
        self.inner.env.read().clone()
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.env.write().insert(key.into(), value.into());
    }
}
