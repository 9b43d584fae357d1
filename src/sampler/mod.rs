//! Sampler engine — background collection into ring buffers.
//!
//! A sampler is either **active** (calls a tool every `interval` through the
//! dispatcher) or **passive** (captures log messages and/or event
//! publications). Each sampler runs as its own task and owns its
//! [`RingBuffer`]; reads, stops and inspections are commands answered from
//! inside that task, so the buffer needs no locking.
//!
//! ```text
//!   sample_start ──┐                     ┌── Tick ── Dispatcher::call
//!   sample_listen ─┼─► SamplerManager ──►│   Sampler task (select! loop)
//!   sample_read ───┤     (id → handle)   ├── LogBus / EventBus receivers
//!   sample_stop ───┘                     └── RingBuffer
//! ```

mod manager;
pub mod ring;
mod task;

pub use manager::SamplerManager;
pub use ring::{RingBuffer, SampleEntry};

use crate::bus::{EventRef, LogLevel, LogSourceKind};
use crate::types::{NodeName, SamplerId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Sampler mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerMode {
    Active,
    Passive,
}

impl fmt::Display for SamplerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerMode::Active => write!(f, "active"),
            SamplerMode::Passive => write!(f, "passive"),
        }
    }
}

/// Active mode: call `tool` with `arguments` every `interval`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSpec {
    pub tool: String,
    pub arguments: Value,
    pub interval: Duration,
    /// Samples to collect. 0 = until stopped.
    pub count: u64,
    /// Consecutive failures that end the sampler. 0 = keep retrying.
    pub max_errors: u32,
}

/// Passive mode: what to listen to.
#[derive(Debug, Clone, PartialEq)]
pub struct PassiveSpec {
    /// Log levels to capture. Empty = no log capture.
    pub log_levels: Vec<LogLevel>,
    /// Only keep log messages from this kind of source.
    pub log_source: Option<LogSourceKind>,
    pub event: Option<EventRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SamplerSource {
    Active(ActiveSpec),
    Passive(PassiveSpec),
}

impl SamplerSource {
    pub fn mode(&self) -> SamplerMode {
        match self {
            SamplerSource::Active(_) => SamplerMode::Active,
            SamplerSource::Passive(_) => SamplerMode::Passive,
        }
    }
}

/// Everything needed to start a sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub id: SamplerId,
    /// Node that requested the sampler.
    pub owner: NodeName,
    /// Lifetime limit. `Duration::ZERO` = unbounded.
    pub duration: Duration,
    /// Ring buffer capacity. 0 = default.
    pub buffer_size: usize,
    pub source: SamplerSource,
}

/// Answer to a read command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleReadResponse {
    pub sampler_id: SamplerId,
    pub mode: SamplerMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Sequence number the next entry will get.
    pub sequence: u64,
    pub completed: bool,
    pub samples: Vec<SampleEntry>,
}

/// Human-readable sampler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerStatus {
    Running,
    Expired,
    Completed,
}

/// Descriptor reported by `sample_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerInfo {
    pub id: SamplerId,
    pub description: String,
    pub status: SamplerStatus,
    pub owner: String,
    pub samples: String,
    pub uptime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,
}
