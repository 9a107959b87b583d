//! Options for signals, async state cells and task chains.
//!
//! Every struct here deserializes with `#[serde(default)]`, so a TOML file only
//! needs to name the fields it changes:
//!
//! ```toml
//! [signal]
//! flush = "post"
//! capacity = 16
//!
//! [state]
//! delay_ms = 50
//! policy = "restart"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When observer callbacks run relative to the write that triggered them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTiming {
    /// Queued on the scheduler's pre queue, drained before any post job.
    #[default]
    Pre,
    /// Queued on the scheduler's post queue.
    Post,
    /// Invoked inline, before the write returns.
    Sync,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalOptions {
    /// Notify on in-place `update` as well as on `set`.
    pub deep: bool,
    pub flush: FlushTiming,
    /// Maximum number of observers (callbacks and subscribers). `None` is unbounded.
    pub capacity: Option<usize>,
}

impl SignalOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == Some(0) {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn flush(mut self, flush: FlushTiming) -> Self {
        self.flush = flush;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// What `execute()` does when a run is already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReinvokePolicy {
    /// Keep the running computation; the new call is a no-op.
    #[default]
    Ignore,
    /// Start a fresh run; the superseded run's result is discarded.
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncStateOptions {
    pub immediate: bool,
    pub reset_on_execute: bool,
    pub delay_ms: u64,
    pub policy: ReinvokePolicy,
    pub signal: SignalOptions,
}

impl Default for AsyncStateOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            reset_on_execute: true,
            delay_ms: 0,
            policy: ReinvokePolicy::Ignore,
            signal: SignalOptions::default(),
        }
    }
}

impl AsyncStateOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signal.validate()
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    pub signal: SignalOptions,
}

impl ChainOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signal.validate()
    }
}

/// Defaults applied by a `Scope` to everything it creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TendrilConfig {
    pub signal: SignalOptions,
    pub state: AsyncStateOptions,
    pub chain: ChainOptions,
}

impl TendrilConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: TendrilConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signal.validate()?;
        self.state.validate()?;
        self.chain.validate()
    }
}
