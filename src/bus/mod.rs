//! Node subsystems that samplers listen to.
//!
//! Patterns supported:
//!   - **Logs**: level-filtered fan-out to named loggers
//!   - **Events**: pub/sub on events registered by their owning node

pub mod events;
pub mod logs;

pub use events::{EventBus, EventInfo, EventMessage, EventRef};
pub use logs::{
    LogBus, LogBusLayer, LogLevel, LogMessage, LogSource, LogSourceKind, LoggerInfo,
    LoggerSubscription,
};
