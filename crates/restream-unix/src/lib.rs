//! Unix-specific process-group termination implementation

mod unix_group_terminator;

pub use unix_group_terminator::UnixGroupTerminator;

/// Unix-specific terminator factory
pub struct UnixGroupTerminatorFactory;

impl UnixGroupTerminatorFactory {
    pub fn create_terminator() -> UnixGroupTerminator {
        UnixGroupTerminator::new()
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
