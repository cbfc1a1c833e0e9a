#[cfg(unix)]
mod unix_impl {
    use async_trait::async_trait;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use restream_core::{GroupTerminator, ProcessId, TerminationResult};
    use sysinfo::System;
    use tracing::{info, warn};

    /// Unix terminator: process-group signaling via `killpg`, plus a
    /// sysinfo-backed broadcast kill by executable name for emergency
    /// recovery
    pub struct UnixGroupTerminator {
        system: std::sync::Mutex<System>,
    }

    impl UnixGroupTerminator {
        pub fn new() -> Self {
            Self {
                system: std::sync::Mutex::new(System::new_all()),
            }
        }

        fn signal_group(pid: ProcessId, sig: Signal) -> TerminationResult {
            let pgid = NixPid::from_raw(pid as i32);

            match signal::killpg(pgid, sig) {
                Ok(()) => {
                    info!("Sent {} to process group {}", sig, pid);
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => {
                    info!("Process group {} not found (already terminated)", pid);
                    TerminationResult::ProcessNotFound
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!("Permission denied to signal process group {}", pid);
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!("Failed to send {} to process group {}: {}", sig, pid, e);
                    TerminationResult::Failed(format!("{sig} to process group failed: {e}"))
                }
            }
        }
    }

    impl Default for UnixGroupTerminator {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl GroupTerminator for UnixGroupTerminator {
        async fn terminate_group(&self, pid: ProcessId) -> TerminationResult {
            Self::signal_group(pid, Signal::SIGTERM)
        }

        async fn kill_group(&self, pid: ProcessId) -> TerminationResult {
            Self::signal_group(pid, Signal::SIGKILL)
        }

        async fn kill_all_by_name(&self, name: &str) -> usize {
            let mut system = self.system.lock().unwrap();
            system.refresh_processes_specifics(
                sysinfo::ProcessesToUpdate::All,
                true,
                sysinfo::ProcessRefreshKind::default(),
            );

            let mut killed = 0;
            for (pid, process) in system.processes() {
                if process.name().to_string_lossy() != name {
                    continue;
                }
                if process.kill() {
                    info!("Killed {} process with PID {}", name, pid.as_u32());
                    killed += 1;
                } else {
                    warn!("Failed to kill {} process with PID {}", name, pid.as_u32());
                }
            }

            if killed == 0 {
                info!("No {} processes found to kill", name);
            }
            killed
        }
    }

}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::UnixGroupTerminator;

// Provide an inert stub so the crate still compiles off-Unix
#[cfg(not(unix))]
pub struct UnixGroupTerminator;

#[cfg(not(unix))]
impl UnixGroupTerminator {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Default for UnixGroupTerminator {
    fn default() -> Self {
        Self::new()
    }
}
