//! Tendril Runtime - Fire-and-Forget Async State
//!
//! - `AsyncStateCell`: one async computation exposed as value/error/loading/ready cells
//! - `AsyncTaskChain`: async tasks run strictly in sequence, each feeding the next
//! - `Scope`: owns the spawner, scheduler and defaults, and disposes what it created
//!
//! Constructors never await: they spawn the work and return with every field
//! readable at its initial value.

pub mod chain;
pub mod executor;
pub mod scope;
pub mod state;

pub mod prelude {
    pub use crate::chain::{AsyncTaskChain, ChainBuilder};
    pub use crate::executor::{Disposable, Spawn, TokioSpawner};
    pub use crate::scope::Scope;
    pub use crate::state::{AsyncSnapshot, AsyncStateBuilder, AsyncStateCell};
}

pub use chain::{AsyncTaskChain, ChainBuilder, TaskFn};
pub use executor::{BoxFuture, Disposable, Liveness, Spawn, TokioSpawner};
pub use scope::Scope;
pub use state::{AsyncSnapshot, AsyncStateBuilder, AsyncStateCell};
