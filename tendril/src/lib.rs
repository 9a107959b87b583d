//! Tendril facade crate.
//!
//! Re-exports the core, runtime and observe crates behind a single entry point.
//!
//! ```rust,no_run
//! use tendril::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let scope = Scope::current()?;
//! let greeting = AsyncStateCell::<String, String>::new(
//!     &scope,
//!     || async { Ok("hello".to_string()) },
//!     String::new(),
//! )?;
//! assert!(greeting.is_loading().get());
//! # Ok(())
//! # }
//! ```

pub use tendril_core as core;
#[cfg(feature = "observe")]
pub use tendril_observe as observe;
pub use tendril_runtime as runtime;

pub use tendril_core::{ChainError, ChainStatus, ObservableCell, Signal, TaskState, TendrilConfig};
pub use tendril_runtime::{AsyncStateCell, AsyncTaskChain, Scope};

pub mod prelude {
    pub use tendril_core::prelude::*;
    pub use tendril_runtime::prelude::*;
}
