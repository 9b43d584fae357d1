//! Log subsystem — level-filtered fan-out of node log messages.
//!
//! Loggers subscribe by name with a set of levels and receive every matching
//! [`LogMessage`] on an unbounded channel. The bus is fed either directly
//! (`publish`) or from the node's own `tracing` events via [`LogBusLayer`].
//!
//! Publishing is synchronous and never emits tracing events itself, so it is
//! safe to call from inside a tracing layer.

use crate::types::{Error, NodeName, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

// =============================================================================
// Levels and sources
// =============================================================================

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Panic,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Panic => "panic",
        }
    }

    /// Case-insensitive parse of a level name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "panic" => Some(LogLevel::Panic),
            _ => None,
        }
    }

    /// Levels captured when a listener asks for none explicitly.
    pub fn defaults() -> Vec<LogLevel> {
        vec![
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Panic,
        ]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::TRACE {
            LogLevel::Trace
        } else if level == tracing::Level::DEBUG {
            LogLevel::Debug
        } else if level == tracing::Level::INFO {
            LogLevel::Info
        } else if level == tracing::Level::WARN {
            LogLevel::Warning
        } else {
            LogLevel::Error
        }
    }
}

/// Where a log message originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogSource {
    Process {
        pid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        behavior: String,
    },
    Meta {
        alias: String,
        parent: String,
        behavior: String,
    },
    Node {
        node: String,
    },
    Network {
        node: String,
        peer: String,
    },
}

/// Source category, used by listeners to filter messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSourceKind {
    Process,
    Meta,
    Node,
    Network,
}

impl LogSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSourceKind::Process => "process",
            LogSourceKind::Meta => "meta",
            LogSourceKind::Node => "node",
            LogSourceKind::Network => "network",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "process" => Some(LogSourceKind::Process),
            "meta" => Some(LogSourceKind::Meta),
            "node" => Some(LogSourceKind::Node),
            "network" => Some(LogSourceKind::Network),
            _ => None,
        }
    }
}

impl LogSource {
    pub fn kind(&self) -> LogSourceKind {
        match self {
            LogSource::Process { .. } => LogSourceKind::Process,
            LogSource::Meta { .. } => LogSourceKind::Meta,
            LogSource::Node { .. } => LogSourceKind::Node,
            LogSource::Network { .. } => LogSourceKind::Network,
        }
    }

    /// Human-readable origin, e.g. `<0.1.1003> (web_worker) HttpWorker`.
    pub fn describe(&self) -> String {
        match self {
            LogSource::Process {
                pid,
                name: Some(name),
                behavior,
            } => format!("{} ({}) {}", pid, name, behavior),
            LogSource::Process {
                pid,
                name: None,
                behavior,
            } => format!("{} {}", pid, behavior),
            LogSource::Meta {
                alias,
                parent,
                behavior,
            } => format!("{} (parent: {}) {}", alias, parent, behavior),
            LogSource::Node { node } => node.clone(),
            LogSource::Network { node, peer } => format!("{} <-> {}", node, peer),
        }
    }
}

/// A single log message as delivered to loggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub time: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: LogSource,
}

impl LogMessage {
    pub fn new(level: LogLevel, message: impl Into<String>, source: LogSource) -> Self {
        Self {
            time: Utc::now(),
            level,
            message: message.into(),
            source,
        }
    }
}

// =============================================================================
// LogBus
// =============================================================================

#[derive(Debug)]
struct Logger {
    levels: Vec<LogLevel>,
    tx: mpsc::UnboundedSender<LogMessage>,
}

#[derive(Debug)]
struct LogBusInner {
    loggers: HashMap<String, Logger>,
    published: u64,
    /// Node threshold. `None` disables publishing.
    level: Option<LogLevel>,
}

impl Default for LogBusInner {
    fn default() -> Self {
        Self {
            loggers: HashMap::new(),
            published: 0,
            level: Some(LogLevel::Info),
        }
    }
}

/// Registered logger, as reported by `loggers_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerInfo {
    pub name: String,
    pub levels: Vec<LogLevel>,
}

/// Receipt for a logger subscription.
#[derive(Debug, Clone)]
pub struct LoggerSubscription {
    pub name: String,
    pub levels: Vec<LogLevel>,
}

/// In-memory log subsystem shared by every component of a node.
#[derive(Debug, Clone, Default)]
pub struct LogBus {
    inner: Arc<RwLock<LogBusInner>>,
}

impl LogBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every logger registered for its level.
    ///
    /// Returns the number of loggers that received it. Messages below the
    /// node level are dropped. Loggers whose receiver is gone are skipped.
    pub fn publish(&self, message: LogMessage) -> usize {
        let mut inner = self.inner.write();
        if !accepts(inner.level, message.level) {
            return 0;
        }
        inner.published += 1;

        let mut delivered = 0;
        for logger in inner.loggers.values() {
            if logger.levels.contains(&message.level) && logger.tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Register a logger under `name` for the given levels.
    pub fn subscribe(
        &self,
        name: impl Into<String>,
        levels: &[LogLevel],
    ) -> Result<(LoggerSubscription, mpsc::UnboundedReceiver<LogMessage>)> {
        let name = name.into();
        if levels.is_empty() {
            return Err(Error::validation(format!(
                "logger {} needs at least one level",
                name
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.inner.write();
            if inner.loggers.contains_key(&name) {
                return Err(Error::validation(format!(
                    "Logger already registered: {}",
                    name
                )));
            }
            inner.loggers.insert(
                name.clone(),
                Logger {
                    levels: levels.to_vec(),
                    tx,
                },
            );
        }

        // Lock released before logging: LogBusLayer publishes back into this bus.
        tracing::debug!(logger = %name, ?levels, "logger registered");

        Ok((
            LoggerSubscription {
                name,
                levels: levels.to_vec(),
            },
            rx,
        ))
    }

    /// Remove a logger. Returns false if it was not registered.
    pub fn unsubscribe(&self, name: &str) -> bool {
        let removed = self.inner.write().loggers.remove(name).is_some();
        if removed {
            tracing::debug!(logger = %name, "logger removed");
        }
        removed
    }

    /// All registered loggers, sorted by name.
    pub fn loggers(&self) -> Vec<LoggerInfo> {
        let inner = self.inner.read();
        let mut loggers: Vec<LoggerInfo> = inner
            .loggers
            .iter()
            .map(|(name, logger)| LoggerInfo {
                name: name.clone(),
                levels: logger.levels.clone(),
            })
            .collect();
        loggers.sort_by(|a, b| a.name.cmp(&b.name));
        loggers
    }

    /// Node log level, `None` when logging is disabled. Defaults to info.
    pub fn level(&self) -> Option<LogLevel> {
        self.inner.read().level
    }

    pub fn set_level(&self, level: Option<LogLevel>) {
        self.inner.write().level = level;
    }

    /// Whether a message at `level` would be published.
    pub fn enabled(&self, level: LogLevel) -> bool {
        accepts(self.inner.read().level, level)
    }

    pub fn has_loggers(&self) -> bool {
        !self.inner.read().loggers.is_empty()
    }

    /// Total messages published since the bus was created.
    pub fn published(&self) -> u64 {
        self.inner.read().published
    }
}

fn accepts(threshold: Option<LogLevel>, level: LogLevel) -> bool {
    threshold.is_some_and(|min| level >= min)
}

// =============================================================================
// tracing bridge
// =============================================================================

/// `tracing` layer that republishes the node's own events on a [`LogBus`].
#[derive(Debug, Clone)]
pub struct LogBusLayer {
    bus: LogBus,
    node: NodeName,
}

impl LogBusLayer {
    pub fn new(bus: LogBus, node: NodeName) -> Self {
        Self { bus, node }
    }
}

impl<S> Layer<S> for LogBusLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from(*event.metadata().level());
        if !self.bus.has_loggers() || !self.bus.enabled(level) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.bus.publish(LogMessage::new(
            level,
            visitor.finish(),
            LogSource::Node {
                node: self.node.to_string(),
            },
        ));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    fn node_source() -> LogSource {
        LogSource::Node {
            node: "alpha@localhost".to_string(),
        }
    }

    #[test]
    fn test_publish_respects_levels() {
        let bus = LogBus::new();
        let (_sub, mut rx) = bus
            .subscribe("errors_only", &[LogLevel::Error])
            .unwrap();

        assert_eq!(
            bus.publish(LogMessage::new(LogLevel::Info, "hello", node_source())),
            0
        );
        assert_eq!(
            bus.publish(LogMessage::new(LogLevel::Error, "boom", node_source())),
            1
        );

        let received = rx.try_recv().unwrap();
        assert_eq!(received.message, "boom");
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_node_level_gates_publish() {
        let bus = LogBus::new();
        let (_sub, mut rx) = bus
            .subscribe("everything", &[LogLevel::Debug, LogLevel::Info])
            .unwrap();
        assert_eq!(bus.level(), Some(LogLevel::Info));

        assert_eq!(
            bus.publish(LogMessage::new(LogLevel::Debug, "hidden", node_source())),
            0
        );
        assert_eq!(bus.published(), 0);

        bus.set_level(Some(LogLevel::Debug));
        assert_eq!(
            bus.publish(LogMessage::new(LogLevel::Debug, "shown", node_source())),
            1
        );
        assert_eq!(rx.try_recv().unwrap().message, "shown");

        bus.set_level(None);
        assert!(!bus.enabled(LogLevel::Panic));
        assert_eq!(
            bus.publish(LogMessage::new(LogLevel::Info, "muted", node_source())),
            0
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_duplicate_logger_rejected() {
        let bus = LogBus::new();
        let (_sub, _rx) = bus.subscribe("dup", &LogLevel::defaults()).unwrap();
        let err = bus.subscribe("dup", &LogLevel::defaults()).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = LogBus::new();
        let (_sub, _rx) = bus.subscribe("tmp", &[LogLevel::Info]).unwrap();
        assert!(bus.unsubscribe("tmp"));
        assert!(!bus.unsubscribe("tmp"));
        assert!(bus.loggers().is_empty());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("warn"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_source_describe() {
        let src = LogSource::Process {
            pid: "<0.0.1003>".to_string(),
            name: Some("web".to_string()),
            behavior: "HttpWorker".to_string(),
        };
        assert_eq!(src.describe(), "<0.0.1003> (web) HttpWorker");
        assert_eq!(src.kind(), LogSourceKind::Process);

        let src = LogSource::Network {
            node: "a@h".to_string(),
            peer: "b@h".to_string(),
        };
        assert_eq!(src.describe(), "a@h <-> b@h");
    }

    #[test]
    fn test_layer_forwards_tracing_events() {
        let bus = LogBus::new();
        let (_sub, mut rx) = bus.subscribe("capture", &[LogLevel::Warning]).unwrap();

        let node = NodeName::from_string("alpha@localhost".to_string()).unwrap();
        let subscriber =
            tracing_subscriber::registry().with(LogBusLayer::new(bus.clone(), node));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(peer = "beta", "link degraded");
        });

        let received = rx.try_recv().unwrap();
        assert_eq!(received.level, LogLevel::Warning);
        assert_eq!(received.message, "link degraded peer=beta");
        assert_eq!(received.source.kind(), LogSourceKind::Node);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_layer_follows_node_level() {
        let bus = LogBus::new();
        let (_sub, mut rx) = bus.subscribe("capture", &[LogLevel::Debug]).unwrap();

        let node = NodeName::from_string("alpha@localhost".to_string()).unwrap();
        let subscriber =
            tracing_subscriber::registry().with(LogBusLayer::new(bus.clone(), node));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("before");
            bus.set_level(Some(LogLevel::Debug));
            tracing::debug!("after");
        });

        assert_eq!(rx.try_recv().unwrap().message, "after");
        assert!(rx.try_recv().is_err());
    }
}
