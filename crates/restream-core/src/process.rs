use async_trait::async_trait;
use std::time::Duration;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Result of a termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Signal delivered (or nothing left to signal after escalation)
    Success,
    /// Target was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges for the target
    AccessDenied,
    /// Operation failed with a specific error message
    Failed(String),
}

impl TerminationResult {
    /// Whether the target can be considered gone after this result
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TerminationResult::Success | TerminationResult::ProcessNotFound
        )
    }
}

/// Platform capability for signaling an entire process group
///
/// Encoders routinely spawn helper processes; a bare terminate on the direct
/// child would leave them orphaned, so both signals target the whole group.
/// Platform-specific backings are selected at build time, never branched
/// inline at call sites.
#[async_trait]
pub trait GroupTerminator: Send + Sync {
    /// Send the graceful termination signal (SIGTERM on Unix) to the group
    async fn terminate_group(&self, pid: ProcessId) -> TerminationResult;

    /// Send the forceful kill signal (SIGKILL on Unix) to the group
    async fn kill_group(&self, pid: ProcessId) -> TerminationResult;

    /// Best-effort broadcast kill of every process whose executable matches
    /// `name`, for recovery when the owned handle is believed stale.
    /// Returns how many processes were signaled; idempotent no-op when
    /// nothing matches.
    async fn kill_all_by_name(&self, name: &str) -> usize;

    /// Graceful-then-forced escalation against the group
    ///
    /// Used when no child handle is available to await; callers that own the
    /// handle should instead bound the wait themselves and escalate on
    /// timeout.
    async fn escalate(&self, pid: ProcessId, grace: Duration) -> TerminationResult {
        match self.terminate_group(pid).await {
            TerminationResult::Success => {
                tokio::time::sleep(grace).await;
                match self.kill_group(pid).await {
                    // the group vanishing during the grace period is success
                    TerminationResult::ProcessNotFound => TerminationResult::Success,
                    result => result,
                }
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTerminator {
        calls: Mutex<Vec<&'static str>>,
        group_alive: bool,
    }

    #[async_trait]
    impl GroupTerminator for RecordingTerminator {
        async fn terminate_group(&self, _pid: ProcessId) -> TerminationResult {
            self.calls.lock().unwrap().push("term");
            TerminationResult::Success
        }

        async fn kill_group(&self, _pid: ProcessId) -> TerminationResult {
            self.calls.lock().unwrap().push("kill");
            if self.group_alive {
                TerminationResult::Success
            } else {
                TerminationResult::ProcessNotFound
            }
        }

        async fn kill_all_by_name(&self, _name: &str) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn test_escalate_sends_both_signals_in_order() {
        let terminator = RecordingTerminator {
            group_alive: true,
            ..Default::default()
        };
        let result = terminator.escalate(42, Duration::from_millis(10)).await;
        assert_eq!(result, TerminationResult::Success);
        assert_eq!(*terminator.calls.lock().unwrap(), vec!["term", "kill"]);
    }

    #[tokio::test]
    async fn test_escalate_treats_vanished_group_as_success() {
        let terminator = RecordingTerminator::default();
        let result = terminator.escalate(42, Duration::from_millis(10)).await;
        assert_eq!(result, TerminationResult::Success);
    }

    #[test]
    fn test_terminal_results() {
        assert!(TerminationResult::Success.is_terminal());
        assert!(TerminationResult::ProcessNotFound.is_terminal());
        assert!(!TerminationResult::AccessDenied.is_terminal());
        assert!(!TerminationResult::Failed("x".to_string()).is_terminal());
    }
}
