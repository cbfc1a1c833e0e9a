//! Restream Core - Platform-independent abstractions for the stream supervisor
//!
//! This crate provides the configuration, error types, encoder output parser,
//! event channel, and process-termination traits that are shared across the
//! platform-specific implementations and the supervisor facade.

mod config;
mod encoder;
mod error;
mod events;
mod history;
mod parser;
mod process;
mod stats;

pub use config::*;
pub use encoder::*;
pub use error::*;
pub use events::*;
pub use history::*;
pub use parser::*;
pub use process::*;
pub use stats::*;
