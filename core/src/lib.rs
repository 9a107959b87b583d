//! Tendril Core - Observable Cells and Shared Contracts
//!
//! This crate holds everything the async primitives are built on:
//! - `Signal`: the observable cell (`ObservableCell` capability)
//! - `Scheduler`: deferred pre/post observer flushing
//! - `Task`: the contract for one step of a task chain
//! - config, status and error types
//!
//! Nothing here spawns work; execution lives in `tendril-runtime`.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod signal;
pub mod status;
pub mod task;
pub mod timeline;

pub mod prelude {
    pub use crate::config::{
        AsyncStateOptions, ChainOptions, FlushTiming, ReinvokePolicy, SignalOptions,
        TendrilConfig,
    };
    pub use crate::error::{ChainError, ConfigError, SignalError, SpawnError};
    pub use crate::scheduler::Scheduler;
    pub use crate::signal::{ObservableCell, ObserverId, Signal};
    pub use crate::status::{ChainStatus, TaskState};
    pub use crate::task::Task;
}

pub use config::{
    AsyncStateOptions, ChainOptions, FlushTiming, ReinvokePolicy, SignalOptions, TendrilConfig,
};
pub use error::{ChainError, ConfigError, SignalError, SpawnError};
pub use scheduler::Scheduler;
pub use signal::{ObservableCell, ObserverId, Signal};
pub use status::{ChainStatus, TaskState};
pub use task::Task;
pub use timeline::{Timeline, TimelineEvent};
