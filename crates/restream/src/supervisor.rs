use restream_core::{
    build_args, parse_line, EventChannel, GroupTerminator, HistoryRecorder, LogEvent, LogHistory,
    LogLevel, ProcessId, RuntimeStats, SessionRecord, SessionStatus, StreamConfig, StreamError,
    SupervisorOptions,
};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::platform;

/// Lifecycle state of the supervisor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SupervisorState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Everything owned for one active session
struct ActiveSession {
    /// Cleared exactly once; whoever wins the swap owns reaping the child
    /// and reporting the finalized session record
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    child: Arc<tokio::sync::Mutex<Option<tokio::process::Child>>>,
    pid: Option<ProcessId>,
    reader: JoinHandle<()>,
    record: Arc<StdMutex<SessionRecord>>,
}

/// StreamSupervisor owns the external encoder process and its lifecycle.
///
/// It spawns the encoder in its own process group, runs one background reader
/// task that turns the combined stdout/stderr into log events and metric
/// snapshots, and terminates the whole group gracefully-then-forcefully on
/// `stop()`. At most one encoder process is owned at a time.
///
/// All caller-facing accessors are non-blocking and safe to call concurrently
/// with the reader task: metrics are copy-out snapshots, never live
/// references into supervisor state.
pub struct StreamSupervisor {
    options: SupervisorOptions,
    recorder: Arc<dyn HistoryRecorder>,
    terminator: Arc<dyn GroupTerminator>,
    state: Arc<StdMutex<SupervisorState>>,
    channel: Arc<EventChannel>,
    /// Latest fully-formed stats; written only by the reader task
    latest_stats: Arc<StdMutex<RuntimeStats>>,
    /// Consumer-side retention of drained log events
    history: StdMutex<LogHistory>,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl StreamSupervisor {
    /// Create a supervisor with the platform termination backend and default
    /// options
    pub fn new(recorder: Arc<dyn HistoryRecorder>) -> Self {
        Self::with_options(recorder, SupervisorOptions::default())
    }

    pub fn with_options(recorder: Arc<dyn HistoryRecorder>, options: SupervisorOptions) -> Self {
        Self::with_terminator(recorder, options, platform::group_terminator())
    }

    /// Full dependency injection, used by tests and alternate backends
    pub fn with_terminator(
        recorder: Arc<dyn HistoryRecorder>,
        options: SupervisorOptions,
        terminator: Arc<dyn GroupTerminator>,
    ) -> Self {
        Self {
            options,
            recorder,
            terminator,
            state: Arc::new(StdMutex::new(SupervisorState::Idle)),
            channel: Arc::new(EventChannel::new()),
            latest_stats: Arc::new(StdMutex::new(RuntimeStats::default())),
            history: StdMutex::new(LogHistory::default()),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the encoder for `config` and begin supervising it
    pub async fn start(&self, config: StreamConfig) -> Result<(), StreamError> {
        config
            .validate()
            .map_err(|e| StreamError::InvalidConfig(e.to_string()))?;

        let mut guard = self.session.lock().await;
        if self.state() != SupervisorState::Idle {
            return Err(StreamError::AlreadyRunning);
        }
        // drop the remains of a naturally finished session
        guard.take();
        self.set_state(SupervisorState::Starting);

        let args = build_args(&config);
        // log only the head of the argv; the tail carries the stream key
        self.push_event(
            format!(
                "Starting stream with command: {} {} ...",
                self.options.encoder_command,
                args[..4].join(" ")
            ),
            LogLevel::Info,
        );
        info!(
            encoder = %self.options.encoder_command,
            video = %config.video_path.display(),
            bitrate_kbps = config.bitrate_kbps,
            "Starting encoder process"
        );

        let mut cmd = Command::new(&self.options.encoder_command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so stop() can signal the encoder and any helper
        // processes it spawns as one unit
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn encoder: {}", e);
                self.set_state(SupervisorState::Idle);
                return Err(StreamError::Spawn(e.to_string()));
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            self.set_state(SupervisorState::Idle);
            return Err(StreamError::Spawn("encoder output pipes unavailable".into()));
        };

        let pid = child.id();
        match pid {
            Some(pid) => info!("Encoder process started with PID {}", pid),
            None => warn!("Encoder started but PID is unavailable (may have exited quickly)"),
        }

        // fresh metrics for the new session
        *self.latest_stats.lock().unwrap() = RuntimeStats::default();
        self.channel.drain_stats();

        let record = Arc::new(StdMutex::new(SessionRecord::opened(
            &config.name,
            &config.video_path.to_string_lossy(),
            &config.stream_key,
        )));
        report_record(&self.recorder, &record).await;

        let running = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();
        let child_handle = Arc::new(tokio::sync::Mutex::new(Some(child)));
        self.set_state(SupervisorState::Running);

        let reader = ReaderTask {
            stdout,
            stderr,
            channel: self.channel.clone(),
            latest_stats: self.latest_stats.clone(),
            running: running.clone(),
            cancel: cancel.clone(),
            child: child_handle.clone(),
            pid,
            grace_period: self.options.grace_period,
            terminator: self.terminator.clone(),
            state: self.state.clone(),
            recorder: self.recorder.clone(),
            record: record.clone(),
        };
        let handle = tokio::spawn(reader.run());

        *guard = Some(ActiveSession {
            running,
            cancel,
            child: child_handle,
            pid,
            reader: handle,
            record,
        });
        self.push_event("Streaming started", LogLevel::Info);
        Ok(())
    }

    /// Stop the running session: graceful group signal, bounded wait, forced
    /// kill on timeout
    pub async fn stop(&self) -> Result<(), StreamError> {
        let mut guard = self.session.lock().await;
        if self.state() != SupervisorState::Running {
            return Err(StreamError::NotRunning);
        }
        let Some(session) = guard.take() else {
            return Err(StreamError::NotRunning);
        };
        self.set_state(SupervisorState::Stopping);

        let ActiveSession {
            running,
            cancel,
            child,
            pid,
            reader,
            record,
        } = session;

        let owned = running.swap(false, Ordering::SeqCst);
        // the reader stops forwarding at its next line boundary
        cancel.cancel();

        if !owned {
            // the encoder finished on its own while we were being called;
            // the reader already reported the finalized record
            let _ = timeout(Duration::from_secs(1), reader).await;
            self.set_state(SupervisorState::Idle);
            return Ok(());
        }

        self.push_event("Stopping stream", LogLevel::Info);
        if let Some(pid) = pid {
            let result = self.terminator.terminate_group(pid).await;
            info!(?result, "Sent graceful termination to process group {}", pid);
        }

        if let Some(mut child) = child.lock().await.take() {
            match timeout(self.options.grace_period, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("Encoder exited within grace period: {}", status);
                }
                Ok(Err(e)) => {
                    warn!("Error waiting for encoder exit: {}", e);
                }
                Err(_) => {
                    warn!(
                        "Encoder ignored graceful termination for {:?}, forcing kill",
                        self.options.grace_period
                    );
                    self.push_event(
                        "termination grace period elapsed, forcing kill",
                        LogLevel::Error,
                    );
                    if let Some(pid) = pid {
                        let result = self.terminator.kill_group(pid).await;
                        info!(?result, "Sent forced kill to process group {}", pid);
                    }
                    // reap the direct child so the session cannot leak a zombie
                    if let Err(e) = child.kill().await {
                        warn!("Failed to reap encoder after forced kill: {}", e);
                    }
                }
            }
        }

        let _ = timeout(Duration::from_secs(1), reader).await;
        finalize_session(&self.recorder, &record, SessionStatus::Stopped).await;
        self.push_event("Streaming stopped by user", LogLevel::Info);
        self.set_state(SupervisorState::Idle);
        Ok(())
    }

    /// Best-effort recovery when the owned handle is believed stale: kill
    /// every process matching the encoder executable system-wide and force
    /// the supervisor back to `Idle`. Idempotent; never fails.
    pub async fn emergency_stop(&self) {
        warn!("Emergency stop requested");
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.take() {
            let owned = session.running.swap(false, Ordering::SeqCst);
            session.cancel.cancel();
            // Abort the reader before touching the child handle: a reader
            // parked inside `child.wait()` holds the handle's lock, and only
            // dropping its future releases it. Awaiting the aborted handle
            // guarantees the lock is free before we take it.
            session.reader.abort();
            let _ = session.reader.await;
            if let Some(mut child) = session.child.lock().await.take() {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill owned encoder child: {}", e);
                }
            }
            // the aborted reader may already have taken the child out of the
            // handle; sweep the whole group by pid so nothing survives
            if let Some(pid) = session.pid {
                let _ = self.terminator.kill_group(pid).await;
            }
            // the reader can win the swap and then be aborted before it
            // finalizes; an open record here is ours to close either way
            if owned || session.record.lock().unwrap().end_time.is_none() {
                finalize_session(&self.recorder, &session.record, SessionStatus::Stopped).await;
            }
        }

        let killed = self
            .terminator
            .kill_all_by_name(&self.options.encoder_command)
            .await;
        if killed > 0 {
            warn!("Emergency stop killed {} stray encoder processes", killed);
        }
        self.set_state(SupervisorState::Idle);
        self.push_event("Emergency stop executed", LogLevel::Info);
    }

    /// Latest coalesced metrics; safe from any state, never blocks
    pub fn snapshot_stats(&self) -> RuntimeStats {
        self.latest_stats.lock().unwrap().clone()
    }

    /// Newest stats snapshot since the previous drain, if any
    pub fn drain_stats(&self) -> Option<RuntimeStats> {
        self.channel.drain_stats()
    }

    /// Remove and return all pending log events in emission order, feeding
    /// the capped retention ring as they pass through
    pub fn drain_logs(&self) -> Vec<LogEvent> {
        let events = self.channel.drain_logs();
        self.history.lock().unwrap().extend(events.iter().cloned());
        events
    }

    /// The most recent `n` retained log events, oldest first
    pub fn recent_logs(&self, n: usize) -> Vec<LogEvent> {
        self.history.lock().unwrap().recent(n)
    }

    pub fn clear_logs(&self) {
        self.history.lock().unwrap().clear();
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap()
    }

    /// Read-only projection for polling consumers
    pub fn is_running(&self) -> bool {
        self.state() == SupervisorState::Running
    }

    fn set_state(&self, state: SupervisorState) {
        *self.state.lock().unwrap() = state;
    }

    fn push_event(&self, message: impl Into<String>, level: LogLevel) {
        self.channel.push_log(LogEvent::new(message, level));
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        // Emergency cleanup; everything here is best-effort and non-blocking
        if let Ok(mut guard) = self.session.try_lock() {
            if let Some(session) = guard.take() {
                session.cancel.cancel();
                session.reader.abort();
                if let Ok(mut child_guard) = session.child.try_lock() {
                    if let Some(child) = child_guard.as_mut() {
                        if let Err(e) = child.start_kill() {
                            warn!("Failed to kill encoder child during drop: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Report a record's current shape; recorder failures never abort a stream
async fn report_record(recorder: &Arc<dyn HistoryRecorder>, record: &Arc<StdMutex<SessionRecord>>) {
    let snapshot = record.lock().unwrap().clone();
    if let Err(e) = recorder.record(&snapshot).await {
        warn!("History recorder failed: {:#}", e);
    }
}

/// Finalize with a terminal status and report; a no-op shape change if the
/// record was already closed
async fn finalize_session(
    recorder: &Arc<dyn HistoryRecorder>,
    record: &Arc<StdMutex<SessionRecord>>,
    status: SessionStatus,
) {
    record.lock().unwrap().finalize(status);
    report_record(recorder, record).await;
}

/// Background reader: tails the encoder's combined output line by line,
/// feeding the event channel, until end-of-stream or cancellation
struct ReaderTask {
    stdout: ChildStdout,
    stderr: ChildStderr,
    channel: Arc<EventChannel>,
    latest_stats: Arc<StdMutex<RuntimeStats>>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    child: Arc<tokio::sync::Mutex<Option<tokio::process::Child>>>,
    pid: Option<ProcessId>,
    grace_period: Duration,
    terminator: Arc<dyn GroupTerminator>,
    state: Arc<StdMutex<SupervisorState>>,
    recorder: Arc<dyn HistoryRecorder>,
    record: Arc<StdMutex<SessionRecord>>,
}

impl ReaderTask {
    async fn run(self) {
        let ReaderTask {
            stdout,
            stderr,
            channel,
            latest_stats,
            running,
            cancel,
            child,
            pid,
            grace_period,
            terminator,
            state,
            recorder,
            record,
        } = self;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = out_lines.next_line(), if !out_done => {
                    Self::next(line, &mut out_done, &channel)
                }
                line = err_lines.next_line(), if !err_done => {
                    Self::next(line, &mut err_done, &channel)
                }
            };
            if let Some(line) = line {
                Self::handle_line(&channel, &latest_stats, &line);
            }
            if out_done && err_done {
                break;
            }
        }

        // the loser of this swap leaves reaping and the finalized record to
        // the winner (stop or emergency_stop)
        if !running.swap(false, Ordering::SeqCst) {
            return;
        }

        // Bounded wait: a process can close its output pipes and keep
        // running, so never block on the exit status without a deadline
        let status = {
            let mut child_guard = child.lock().await;
            match child_guard.take() {
                Some(mut child) => match timeout(grace_period, child.wait()).await {
                    Ok(Ok(status)) if status.success() => SessionStatus::Completed,
                    Ok(Ok(status)) => {
                        channel.push_log(LogEvent::new(
                            format!("encoder exited with {status}"),
                            LogLevel::Error,
                        ));
                        SessionStatus::Failed
                    }
                    Ok(Err(e)) => {
                        channel.push_log(LogEvent::new(
                            format!("failed to reap encoder: {e}"),
                            LogLevel::Error,
                        ));
                        SessionStatus::Failed
                    }
                    Err(_) => {
                        warn!(
                            "Encoder closed its output but kept running for {:?}, forcing kill",
                            grace_period
                        );
                        channel.push_log(LogEvent::new(
                            "encoder closed its output but kept running, forcing kill",
                            LogLevel::Error,
                        ));
                        if let Some(pid) = pid {
                            let result = terminator.kill_group(pid).await;
                            info!(?result, "Sent forced kill to process group {}", pid);
                        }
                        if let Err(e) = child.kill().await {
                            warn!("Failed to reap encoder after forced kill: {}", e);
                        }
                        SessionStatus::Failed
                    }
                },
                None => SessionStatus::Completed,
            }
        };

        info!(?status, "Encoder output ended");
        finalize_session(&recorder, &record, status).await;
        channel.push_log(LogEvent::new("Streaming ended", LogLevel::Info));
        *state.lock().unwrap() = SupervisorState::Idle;
    }

    fn next(
        line: std::io::Result<Option<String>>,
        done: &mut bool,
        channel: &EventChannel,
    ) -> Option<String> {
        match line {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                *done = true;
                None
            }
            Err(e) => {
                channel.push_log(LogEvent::new(
                    format!("error reading encoder output: {e}"),
                    LogLevel::Error,
                ));
                *done = true;
                None
            }
        }
    }

    fn handle_line(channel: &EventChannel, latest_stats: &StdMutex<RuntimeStats>, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        let report = parse_line(line);
        if let Some(update) = report.update {
            let snapshot = {
                let mut stats = latest_stats.lock().unwrap();
                update.apply(&mut stats);
                stats.clone()
            };
            channel.push_stats(snapshot);
        }
        channel.push_log(LogEvent::new(line, report.level));
        for error in report.errors {
            channel.push_log(LogEvent::new(error, LogLevel::Error));
        }
    }
}
