pub mod platform;
mod supervisor;

// Re-export core types
pub use restream_core::*;
pub use supervisor::{StreamSupervisor, SupervisorState};
