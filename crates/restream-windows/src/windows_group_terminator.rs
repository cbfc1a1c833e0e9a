use async_trait::async_trait;
use restream_core::{GroupTerminator, ProcessId, TerminationResult};
use sysinfo::System;
use tracing::{info, warn};

/// Windows terminator
///
/// Windows has no POSIX process groups, so both signal phases resolve to a
/// direct `sysinfo` kill of the root process and any children listed in the
/// process table at that moment.
pub struct WindowsGroupTerminator {
    system: std::sync::Mutex<System>,
}

impl WindowsGroupTerminator {
    pub fn new() -> Self {
        Self {
            system: std::sync::Mutex::new(System::new_all()),
        }
    }

    fn kill_tree(&self, root: ProcessId) -> TerminationResult {
        let mut system = self.system.lock().unwrap();
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::All,
            true,
            sysinfo::ProcessRefreshKind::default(),
        );

        let mut targets: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, process)| {
                process
                    .parent()
                    .is_some_and(|ppid| ppid.as_u32() == root)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect();
        targets.push(root);

        let mut found = false;
        for pid in targets {
            if let Some(process) = system.process(sysinfo::Pid::from_u32(pid)) {
                found = true;
                if process.kill() {
                    info!("Killed process {}", pid);
                } else {
                    warn!("Failed to kill process {}", pid);
                    return TerminationResult::Failed(format!("kill of {pid} failed"));
                }
            }
        }

        if found {
            TerminationResult::Success
        } else {
            info!("Process {} not found (already terminated)", root);
            TerminationResult::ProcessNotFound
        }
    }
}

impl Default for WindowsGroupTerminator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupTerminator for WindowsGroupTerminator {
    async fn terminate_group(&self, pid: ProcessId) -> TerminationResult {
        // no graceful signal on Windows; terminate directly
        self.kill_tree(pid)
    }

    async fn kill_group(&self, pid: ProcessId) -> TerminationResult {
        self.kill_tree(pid)
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
            let proc_name = process.name().to_string_lossy();
            if proc_name != name && proc_name != format!("{name}.exe") {
                continue;
            }
            if process.kill() {
                info!("Killed {} process with PID {}", name, pid.as_u32());
                killed += 1;
            }
        }
        killed
    }
}
