use std::path::PathBuf;

use thiserror::Error;

use crate::item::QueueItem;

pub type Result<T> = std::result::Result<T, RunError>;

/// Fatal errors. Any of these ends the run after the resources acquired so
/// far have been released.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to read config file `{}`: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("segment creation failed: {reason}")]
    SegmentCreationFailed { reason: String },

    #[error("segment map failed: {reason}")]
    SegmentMapFailed { reason: &'static str },

    #[error("counter creation failed: capacity {capacity} does not fit a permit counter")]
    CounterCreationFailed { capacity: usize },

    #[error("failed to spawn {role} actor: {source}")]
    ActorSpawnFailed {
        role: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} actor panicked")]
    ActorPanicked { role: &'static str },
}

impl RunError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Returned by `SharedQueue::enqueue` when every slot is occupied. Carries
/// the rejected item back to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("queue is full")]
pub struct QueueFull(pub QueueItem);

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
#[error("queue is empty")]
pub struct QueueEmpty;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum LabelError {
    #[error("label is {len} bytes, at most {max} allowed")]
    TooLong { len: usize, max: usize },
}
