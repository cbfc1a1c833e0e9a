//! Build-time selection of the platform termination backend

use restream_core::GroupTerminator;
use std::sync::Arc;

#[cfg(unix)]
pub fn group_terminator() -> Arc<dyn GroupTerminator> {
    Arc::new(restream_unix::UnixGroupTerminatorFactory::create_terminator())
}

#[cfg(windows)]
pub fn group_terminator() -> Arc<dyn GroupTerminator> {
    Arc::new(restream_windows::WindowsGroupTerminatorFactory::create_terminator())
}

#[cfg(unix)]
pub fn platform_name() -> &'static str {
    restream_unix::UnixGroupTerminatorFactory::platform_name()
}

#[cfg(windows)]
pub fn platform_name() -> &'static str {
    restream_windows::WindowsGroupTerminatorFactory::platform_name()
}

#[cfg(not(any(unix, windows)))]
compile_error!("restream requires a Unix or Windows target");
