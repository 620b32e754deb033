//! # ns-core
//!
//! Core types, traits, and error handling shared by the propagation and
//! likelihood crates.
//!
//! This crate provides:
//! - Common error types
//! - The objective-function boundary consumed by external minimizers
//! - The likelihood buffer and data-type enums
//! - The per-run execution context
//! - Version compatibility checks

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod traits;
pub mod types;
pub mod version;

pub use context::{RunContext, Verbosity};
pub use error::{Error, Result};
pub use traits::ObjectiveFunction;
pub use types::{AvgTimer, DataType, LikelihoodBuffer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
