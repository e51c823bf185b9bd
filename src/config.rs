use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{Result, RunError};

/// How the actors wait for space or items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Two counting permits, `empty_slots` and `filled_slots`. Actors block
    /// until the queue can serve them.
    #[default]
    Blocking,
    /// Mutex only. A full or empty queue costs the iteration a backoff.
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub capacity: usize,
    pub producer_iterations: usize,
    pub consumer_iterations: usize,
    pub producer_delay_ms: u64,
    pub consumer_delay_ms: u64,
    pub backoff_ms: u64,
    pub label_prefix: String,
    pub protocol: Protocol,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            producer_iterations: 5,
            consumer_iterations: 5,
            producer_delay_ms: 1000,
            consumer_delay_ms: 2000,
            backoff_ms: 2000,
            label_prefix: "Patient".to_string(),
            protocol: Protocol::Blocking,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| RunError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects settings under which an actor could never finish. Capacity
    /// itself is checked when the segment and counters are created.
    pub fn validate(&self) -> Result<()> {
        if self.protocol == Protocol::Blocking {
            if self.consumer_iterations > self.producer_iterations {
                return Err(RunError::invalid_config(format!(
                    "consumer would wait forever: {} consumer iterations but only {} items produced",
                    self.consumer_iterations, self.producer_iterations
                )));
            }
            if self.producer_iterations > self.consumer_iterations.saturating_add(self.capacity) {
                return Err(RunError::invalid_config(format!(
                    "producer would wait forever: {} items exceed {} consumed plus capacity {}",
                    self.producer_iterations, self.consumer_iterations, self.capacity
                )));
            }
        }
        if u32::try_from(self.producer_iterations).is_err() {
            return Err(RunError::invalid_config("producer_iterations exceeds item id range"));
        }
        Ok(())
    }

    pub fn producer_delay(&self) -> Duration {
        Duration::from_millis(self.producer_delay_ms)
    }

    pub fn consumer_delay(&self) -> Duration {
        Duration::from_millis(self.consumer_delay_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
