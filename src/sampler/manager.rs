//! Sampler manager — creates samplers and addresses them by id.

use super::task::{Command, Sampler, Subscriptions};
use super::{SampleReadResponse, SamplerConfig, SamplerInfo, SamplerMode, SamplerSource};
use crate::dispatch::Dispatcher;
use crate::types::{Error, Result, SamplerId};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

#[derive(Debug)]
struct SamplerHandle {
    commands: mpsc::UnboundedSender<Command>,
    mode: SamplerMode,
}

/// Registry of live samplers on one node.
#[derive(Debug, Clone)]
pub struct SamplerManager {
    samplers: Arc<RwLock<HashMap<SamplerId, SamplerHandle>>>,
    read_timeout: Duration,
    retention: Duration,
}

impl SamplerManager {
    pub fn new(read_timeout: Duration, retention: Duration) -> Self {
        Self {
            samplers: Arc::new(RwLock::new(HashMap::new())),
            read_timeout,
            retention,
        }
    }

    /// Start a sampler.
    ///
    /// The sampler state is built first, then the id is registered and bus
    /// subscriptions are made before the task is spawned. Any failure here
    /// is returned and nothing is left behind.
    pub async fn start(&self, dispatcher: &Arc<Dispatcher>, config: SamplerConfig) -> Result<SamplerId> {
        validate(&config)?;

        let id = config.id.clone();
        let mode = config.source.mode();
        let sampler = Sampler::new(config, dispatcher.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut samplers = self.samplers.write().await;
            if samplers.contains_key(&id) {
                return Err(Error::validation(format!(
                    "Sampler already registered: {}",
                    id
                )));
            }
            samplers.insert(id.clone(), SamplerHandle { commands: tx, mode });
        }

        tracing::info!(
            sampler = %id,
            %mode,
            duration = ?sampler.config().duration,
            "sampler starting"
        );

        let subscriptions = match subscribe(dispatcher, sampler.config()).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                self.deregister(&id).await;
                tracing::warn!(sampler = %id, error = %e, "sampler initialization failed");
                return Err(e);
            }
        };

        tokio::spawn(sampler.run(rx, subscriptions, self.clone(), self.retention));

        Ok(id)
    }

    /// Read entries with sequence greater than `since` (all when `None`).
    pub async fn read(&self, id: &SamplerId, since: Option<u64>) -> Result<SampleReadResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(id, Command::Read { since, reply }).await?;
        tokio::time::timeout(self.read_timeout, rx)
            .await
            .ok()
            .and_then(|r| r.ok())
            .ok_or_else(|| not_responding(id))
    }

    /// Ask a sampler to stop. A completed sampler acknowledges as well.
    pub async fn stop(&self, id: &SamplerId) -> Result<()> {
        self.send(id, Command::Stop).await?;
        tracing::debug!(sampler = %id, "stop requested");
        Ok(())
    }

    /// Descriptors of every live sampler, sorted by id. Samplers that do
    /// not answer in time are skipped.
    pub async fn list(&self) -> Vec<SamplerInfo> {
        let senders: Vec<(SamplerId, mpsc::UnboundedSender<Command>)> = self
            .samplers
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.commands.clone()))
            .collect();

        let inspections = senders.into_iter().map(|(id, commands)| async move {
            let (reply, rx) = oneshot::channel();
            commands.send(Command::Inspect { reply }).ok()?;
            match tokio::time::timeout(self.read_timeout, rx).await {
                Ok(Ok(info)) => Some(info),
                _ => {
                    tracing::debug!(sampler = %id, "sampler did not answer inspect");
                    None
                }
            }
        });

        let mut infos: Vec<SamplerInfo> = join_all(inspections).await.into_iter().flatten().collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub async fn mode(&self, id: &SamplerId) -> Option<SamplerMode> {
        self.samplers.read().await.get(id).map(|h| h.mode)
    }

    pub async fn len(&self) -> usize {
        self.samplers.read().await.len()
    }

    pub(crate) async fn deregister(&self, id: &SamplerId) {
        self.samplers.write().await.remove(id);
    }

    async fn send(&self, id: &SamplerId, command: Command) -> Result<()> {
        let samplers = self.samplers.read().await;
        let handle = samplers
            .get(id)
            .ok_or_else(|| Error::not_found(format!("sampler {} not found", id)))?;
        handle
            .commands
            .send(command)
            .map_err(|_| not_responding(id))
    }
}

fn not_responding(id: &SamplerId) -> Error {
    Error::not_found(format!("sampler {} not found or not responding", id))
}

fn validate(config: &SamplerConfig) -> Result<()> {
    match &config.source {
        SamplerSource::Active(spec) => {
            if spec.tool.is_empty() {
                return Err(Error::invalid_params("tool is required"));
            }
            if spec.interval.is_zero() {
                return Err(Error::invalid_params("interval must be positive"));
            }
        }
        SamplerSource::Passive(spec) => {
            if spec.log_levels.is_empty() && spec.event.is_none() {
                return Err(Error::invalid_params(
                    "passive sampler needs log levels or an event",
                ));
            }
        }
    }
    Ok(())
}

async fn subscribe(dispatcher: &Arc<Dispatcher>, config: &SamplerConfig) -> Result<Subscriptions> {
    let spec = match &config.source {
        SamplerSource::Passive(spec) => spec,
        SamplerSource::Active(_) => return Ok(Subscriptions::default()),
    };

    let node = dispatcher.node();
    let mut subscriptions = Subscriptions::default();

    if !spec.log_levels.is_empty() {
        let (receipt, rx) = node
            .logs()
            .subscribe(config.id.as_str(), &spec.log_levels)?;
        subscriptions.logger = Some(receipt.name);
        subscriptions.logs = Some(rx);
    }

    if let Some(event) = &spec.event {
        match node.events().subscribe(config.id.as_str(), event).await {
            Ok(rx) => {
                subscriptions.event = Some(event.clone());
                subscriptions.events = Some(rx);
            }
            Err(e) => {
                if let Some(logger) = &subscriptions.logger {
                    node.logs().unsubscribe(logger);
                }
                return Err(Error::not_found(format!(
                    "cannot monitor event {}: {}",
                    event, e
                )));
            }
        }
    }

    Ok(subscriptions)
}
