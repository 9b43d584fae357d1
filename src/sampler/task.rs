//! The sampler task: one `select!` loop per sampler.
//!
//! Ticks, the deadline and the retention window are one-shot timers. A tick
//! is scheduled only after the previous call has resolved, so a slow tool
//! throttles its own sampler instead of piling up calls.

use super::manager::SamplerManager;
use super::ring::{RingBuffer, SampleEntry};
use super::{
    ActiveSpec, PassiveSpec, SampleReadResponse, SamplerConfig, SamplerInfo, SamplerSource,
    SamplerStatus,
};
use crate::bus::{EventMessage, EventRef, LogMessage};
use crate::dispatch::Dispatcher;
use crate::types::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use humantime_serde::re::humantime::format_duration;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Most queued notifications recorded per receiver before a command is
/// answered.
pub(crate) const NOTIFICATION_BATCH: usize = 256;

/// Commands accepted by a running sampler.
#[derive(Debug)]
pub(crate) enum Command {
    Stop,
    Read {
        since: Option<u64>,
        reply: oneshot::Sender<SampleReadResponse>,
    },
    Inspect {
        reply: oneshot::Sender<SamplerInfo>,
    },
}

/// Subscriptions created during initialization.
#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    pub logger: Option<String>,
    pub logs: Option<mpsc::UnboundedReceiver<LogMessage>>,
    pub event: Option<EventRef>,
    pub events: Option<mpsc::UnboundedReceiver<EventMessage>>,
}

pub(crate) struct Sampler {
    config: SamplerConfig,
    dispatcher: Arc<Dispatcher>,
    buffer: RingBuffer,
    sequence: u64,
    errors: u32,
    completed: bool,
    started_at: Instant,
    deadline: Option<Instant>,
    expires_at: Option<DateTime<Utc>>,
    logger: Option<String>,
    event: Option<EventRef>,
}

impl Sampler {
    pub(crate) fn new(config: SamplerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let started_at = Instant::now();
        let (deadline, expires_at) = if config.duration.is_zero() {
            (None, None)
        } else {
            let expires_at = chrono::Duration::from_std(config.duration)
                .ok()
                .map(|d| Utc::now() + d);
            (Some(started_at + config.duration), expires_at)
        };

        Self {
            buffer: RingBuffer::new(config.buffer_size),
            config,
            dispatcher,
            sequence: 0,
            errors: 0,
            completed: false,
            started_at,
            deadline,
            expires_at,
            logger: None,
            event: None,
        }
    }

    pub(crate) fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Drive the sampler until it completes and its retention window ends,
    /// or until every command sender is gone.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        subscriptions: Subscriptions,
        manager: SamplerManager,
        retention: Duration,
    ) {
        self.logger = subscriptions.logger;
        self.event = subscriptions.event;
        let mut logs = subscriptions.logs;
        let mut events = subscriptions.events;

        let mut next_tick = match self.config.source {
            SamplerSource::Active(_) => Some(Instant::now()),
            SamplerSource::Passive(_) => None,
        };
        let mut linger_until: Option<Instant> = None;

        loop {
            let deadline = if self.completed { None } else { self.deadline };

            // The deadline and commands win over notifications. Before a
            // command is handled, a bounded batch of already queued
            // notifications is recorded so it sees what arrived before it.
            tokio::select! {
                biased;

                _ = sleep_until_opt(deadline) => {
                    self.complete("duration elapsed");
                }
                command = commands.recv() => {
                    if command.is_some() {
                        self.drain(&mut logs, &mut events);
                    }
                    match command {
                        Some(Command::Stop) => {
                            if !self.completed {
                                self.complete("stopped");
                            }
                        }
                        Some(Command::Read { since, reply }) => {
                            let _ = reply.send(self.read(since));
                        }
                        Some(Command::Inspect { reply }) => {
                            let _ = reply.send(self.inspect());
                        }
                        None => break,
                    }
                }
                log = recv_opt(&mut logs) => match log {
                    Some(message) => self.on_log(message),
                    None => logs = None,
                },
                event = recv_opt(&mut events) => match event {
                    Some(message) => self.on_event(message),
                    None => events = None,
                },
                _ = sleep_until_opt(next_tick) => {
                    next_tick = self.tick().await;
                }
                _ = sleep_until_opt(linger_until) => break,
            }

            if self.completed && linger_until.is_none() {
                next_tick = None;
                logs = None;
                events = None;
                self.release().await;
                linger_until = Some(Instant::now() + retention);
            }
        }

        self.release().await;
        manager.deregister(&self.config.id).await;
        tracing::debug!(sampler = %self.config.id, "sampler exited");
    }

    /// Record up to [`NOTIFICATION_BATCH`] queued messages from each receiver.
    fn drain(
        &mut self,
        logs: &mut Option<mpsc::UnboundedReceiver<LogMessage>>,
        events: &mut Option<mpsc::UnboundedReceiver<EventMessage>>,
    ) {
        if let Some(rx) = logs {
            for _ in 0..NOTIFICATION_BATCH {
                match rx.try_recv() {
                    Ok(message) => self.on_log(message),
                    Err(_) => break,
                }
            }
        }
        if let Some(rx) = events {
            for _ in 0..NOTIFICATION_BATCH {
                match rx.try_recv() {
                    Ok(message) => self.on_event(message),
                    Err(_) => break,
                }
            }
        }
    }

    fn complete(&mut self, reason: &str) {
        self.completed = true;
        tracing::info!(
            sampler = %self.config.id,
            reason,
            collected = self.sequence,
            "sampler completed"
        );
    }

    /// Drop bus subscriptions. Safe to call more than once.
    async fn release(&mut self) {
        let node = self.dispatcher.node();
        if let Some(logger) = self.logger.take() {
            node.logs().unsubscribe(&logger);
        }
        if let Some(event) = self.event.take() {
            node.events()
                .unsubscribe(self.config.id.as_str(), &event)
                .await;
        }
    }

    fn push(&mut self, timestamp: DateTime<Utc>, data: Value) {
        self.buffer.push(SampleEntry {
            sequence: self.sequence,
            timestamp,
            data,
        });
        self.sequence += 1;
    }

    /// One active-mode call. Returns when the next tick is due, if any.
    async fn tick(&mut self) -> Option<Instant> {
        let spec = match &self.config.source {
            SamplerSource::Active(spec) => spec.clone(),
            SamplerSource::Passive(_) => return None,
        };

        match self.sample(&spec).await {
            Ok(data) => {
                self.errors = 0;
                self.push(Utc::now(), data);
                if spec.count > 0 && self.sequence >= spec.count {
                    self.complete("count reached");
                    return None;
                }
            }
            Err(e) => {
                self.errors += 1;
                tracing::debug!(
                    sampler = %self.config.id,
                    tool = %spec.tool,
                    errors = self.errors,
                    error = %e,
                    "sample failed"
                );
                if spec.max_errors > 0 && self.errors >= spec.max_errors {
                    self.complete("max errors reached");
                    return None;
                }
            }
        }

        Some(Instant::now() + spec.interval)
    }

    async fn sample(&self, spec: &ActiveSpec) -> Result<Value> {
        let result = self
            .dispatcher
            .call(&spec.tool, spec.arguments.clone())
            .await?;
        if result.is_error {
            return Err(Error::internal(result.text_content()));
        }
        Ok(serde_json::to_value(&result)?)
    }

    fn on_log(&mut self, message: LogMessage) {
        if self.completed {
            return;
        }
        if let SamplerSource::Passive(PassiveSpec {
            log_source: Some(kind),
            ..
        }) = &self.config.source
        {
            if message.source.kind() != *kind {
                return;
            }
        }

        let data = json!({
            "time": message.time.to_rfc3339_opts(SecondsFormat::Nanos, true),
            "level": message.level.as_str(),
            "message": message.message,
            "type": message.source.kind().as_str(),
            "source": message.source.describe(),
        });
        self.push(message.time, data);
    }

    fn on_event(&mut self, message: EventMessage) {
        if self.completed {
            return;
        }
        let data = json!({
            "event": message.event.to_string(),
            "message": message.message,
        });
        self.push(message.timestamp, data);
    }

    fn read(&self, since: Option<u64>) -> SampleReadResponse {
        let samples = match since {
            Some(since) => self.buffer.read_since(since),
            None => self.buffer.read_all(),
        };
        let tool = match &self.config.source {
            SamplerSource::Active(spec) => Some(spec.tool.clone()),
            SamplerSource::Passive(_) => None,
        };
        SampleReadResponse {
            sampler_id: self.config.id.clone(),
            mode: self.config.source.mode(),
            tool,
            sequence: self.sequence,
            completed: self.completed,
            samples,
        }
    }

    fn status(&self) -> SamplerStatus {
        if self.completed {
            return SamplerStatus::Completed;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => SamplerStatus::Expired,
            _ => SamplerStatus::Running,
        }
    }

    fn inspect(&self) -> SamplerInfo {
        let remaining = self.deadline.and_then(|deadline| {
            let left = deadline.saturating_duration_since(Instant::now());
            (!left.is_zero()).then(|| format_secs(left))
        });
        let (progress, errors) = match &self.config.source {
            SamplerSource::Active(spec) => (
                (spec.count > 0).then(|| format!("{}/{} samples", self.sequence, spec.count)),
                (self.errors > 0).then(|| format!("{} consecutive", self.errors)),
            ),
            SamplerSource::Passive(_) => (None, None),
        };

        SamplerInfo {
            id: self.config.id.clone(),
            description: describe(&self.config.source),
            status: self.status(),
            owner: self.config.owner.to_string(),
            samples: format!(
                "{} collected, buffer {}/{}",
                self.sequence,
                self.buffer.len(),
                self.buffer.capacity()
            ),
            uptime: format_secs(self.started_at.elapsed()),
            deadline: self
                .expires_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            remaining,
            progress,
            errors,
        }
    }
}

/// One-line summary, e.g. `node_info(limit=5) every 5s` or
/// `listen: log [info, warning] source=node + event orders@alpha`.
pub(crate) fn describe(source: &SamplerSource) -> String {
    match source {
        SamplerSource::Active(spec) => {
            let args = format_args_compact(&spec.arguments);
            let every = format_duration(spec.interval);
            if args.is_empty() {
                format!("{} every {}", spec.tool, every)
            } else {
                format!("{}({}) every {}", spec.tool, args, every)
            }
        }
        SamplerSource::Passive(spec) => {
            let mut parts = Vec::new();
            if !spec.log_levels.is_empty() {
                let levels: Vec<&str> = spec.log_levels.iter().map(|l| l.as_str()).collect();
                let mut desc = format!("log [{}]", levels.join(", "));
                if let Some(kind) = spec.log_source {
                    desc.push_str(&format!(" source={}", kind.as_str()));
                }
                parts.push(desc);
            }
            if let Some(event) = &spec.event {
                parts.push(format!("event {}", event));
            }
            format!("listen: {}", parts.join(" + "))
        }
    }
}

/// `k=v` pairs of an argument object, strings unquoted.
fn format_args_compact(arguments: &Value) -> String {
    match arguments {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn format_secs(d: Duration) -> String {
    format_duration(Duration::from_secs(d.as_secs())).to_string()
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LogLevel, LogSourceKind};
    use crate::types::NodeName;
    use pretty_assertions::assert_eq;

    fn active(tool: &str, arguments: Value, interval_ms: u64) -> SamplerSource {
        SamplerSource::Active(ActiveSpec {
            tool: tool.to_string(),
            arguments,
            interval: Duration::from_millis(interval_ms),
            count: 0,
            max_errors: 0,
        })
    }

    #[test]
    fn test_describe_active() {
        assert_eq!(
            describe(&active("node_info", json!({}), 5_000)),
            "node_info every 5s"
        );
        assert_eq!(
            describe(&active(
                "event_info",
                json!({"name": "orders", "limit": 5}),
                250
            )),
            "event_info(limit=5, name=orders) every 250ms"
        );
    }

    #[test]
    fn test_describe_passive() {
        let source = SamplerSource::Passive(PassiveSpec {
            log_levels: vec![LogLevel::Info, LogLevel::Warning],
            log_source: Some(LogSourceKind::Node),
            event: Some(EventRef {
                name: "orders".to_string(),
                node: NodeName::from_string("alpha@host".to_string()).unwrap(),
            }),
        });
        assert_eq!(
            describe(&source),
            "listen: log [info, warning] source=node + event orders@alpha@host"
        );
    }

    #[test]
    fn test_format_secs_truncates() {
        assert_eq!(format_secs(Duration::from_millis(65_900)), "1m 5s");
        assert_eq!(format_secs(Duration::from_millis(400)), "0s");
    }
}
