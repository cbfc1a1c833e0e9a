//! Windows-specific termination implementation

mod windows_group_terminator;

pub use windows_group_terminator::WindowsGroupTerminator;

/// Windows-specific terminator factory
pub struct WindowsGroupTerminatorFactory;

impl WindowsGroupTerminatorFactory {
    pub fn create_terminator() -> WindowsGroupTerminator {
        WindowsGroupTerminator::new()
    }

    pub fn platform_name() -> &'static str {
        "Windows"
    }
}
