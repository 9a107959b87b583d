use thiserror::Error;

/// A task inside an async task chain failed.
///
/// The chain stops at `index`; no later task is invoked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("task {index} failed, chain halted: {cause}")]
pub struct ChainError<E> {
    pub index: usize,
    pub cause: E,
}

impl<E> ChainError<E> {
    pub fn new(index: usize, cause: E) -> Self {
        Self { index, cause }
    }

    pub fn into_cause(self) -> E {
        self.cause
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("observer capacity of {capacity} reached")]
    CapacityExceeded { capacity: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("signal capacity must be greater than zero")]
    ZeroCapacity,
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("no tokio runtime is available in this context")]
    NoRuntime,
}
