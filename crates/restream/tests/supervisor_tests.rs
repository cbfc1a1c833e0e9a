//! End-to-end supervisor tests driving real child processes
//!
//! Each test stands in a shell script for the encoder: emitting
//! encoder-shaped progress output, running until signaled, or trapping the
//! graceful signal to force the kill escalation.

#![cfg(unix)]

use restream::{
    HistoryRecorder, LogLevel, SessionRecord, SessionStatus, StreamConfig, StreamError,
    StreamSupervisor, SupervisorOptions, SupervisorState,
};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct MemoryRecorder {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryRecorder {
    fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HistoryRecorder for MemoryRecorder {
    async fn record(&self, record: &SessionRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("encoder.sh");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn supervisor_for(
    script: &PathBuf,
    grace: Duration,
) -> (StreamSupervisor, Arc<MemoryRecorder>) {
    let recorder = Arc::new(MemoryRecorder::default());
    let options = SupervisorOptions::builder()
        .encoder_command(script.to_string_lossy().into_owned())
        .grace_period(grace)
        .build()
        .unwrap();
    let supervisor = StreamSupervisor::with_options(recorder.clone(), options);
    (supervisor, recorder)
}

fn config() -> StreamConfig {
    StreamConfig::builder()
        .name("integration test")
        .video_path("video.mp4")
        .stream_key("secret-key-123")
        .build()
        .unwrap()
}

async fn wait_until(cond: impl Fn() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}

#[tokio::test]
async fn test_natural_completion_reports_metrics_and_history() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "#!/bin/sh\n\
         echo \"Input #0, mov, from 'video.mp4'\"\n\
         echo \"frame=120 fps=30.2 bitrate=2500.0kbits/s size=10MB\"\n\
         exit 0\n",
    );
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(5));

    supervisor.start(config()).await.unwrap();
    assert!(
        wait_until(
            || supervisor.state() == SupervisorState::Idle && recorder.records().len() == 2,
            Duration::from_secs(5)
        )
        .await,
        "session did not complete naturally"
    );

    // metrics extracted from the progress line
    let stats = supervisor.snapshot_stats();
    assert_eq!(stats.frames_processed, 120);
    assert_eq!(stats.fps, 30.2);
    assert_eq!(stats.bitrate_kbps, 2500.0);
    assert_eq!(stats.output_size, "10MB");
    assert!(supervisor.drain_stats().is_some());
    assert!(supervisor.drain_stats().is_none());

    // classified log lines, in emission order, no duplicates across drains
    let logs = supervisor.drain_logs();
    let input_pos = logs
        .iter()
        .position(|e| e.message.starts_with("Input #0"))
        .expect("plain line missing");
    let progress_pos = logs
        .iter()
        .position(|e| e.message.starts_with("frame=120"))
        .expect("progress line missing");
    assert!(input_pos < progress_pos);
    assert_eq!(logs[input_pos].level, LogLevel::Info);
    assert_eq!(logs[progress_pos].level, LogLevel::Debug);
    assert!(supervisor.drain_logs().is_empty());

    // one opened record, one finalized record
    let records = recorder.records();
    assert_eq!(records[0].status, SessionStatus::Started);
    assert!(records[0].end_time.is_none());
    assert_eq!(records[1].status, SessionStatus::Completed);
    assert!(records[1].end_time.is_some());
    // the raw credential never reaches history
    assert!(records.iter().all(|r| !r.stream_key_hash.contains("secret")));
}

#[tokio::test]
async fn test_abnormal_exit_records_failed() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "#!/bin/sh\n\
         echo \"Error opening output\" >&2\n\
         exit 1\n",
    );
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(5));

    supervisor.start(config()).await.unwrap();
    assert!(
        wait_until(
            || supervisor.state() == SupervisorState::Idle && recorder.records().len() == 2,
            Duration::from_secs(5)
        )
        .await,
        "session did not finalize"
    );

    let records = recorder.records();
    assert_eq!(records[1].status, SessionStatus::Failed);
    assert!(records[1].end_time.is_some());
    assert_eq!(supervisor.state(), SupervisorState::Idle);

    let logs = supervisor.drain_logs();
    let error_line = logs
        .iter()
        .find(|e| e.message == "Error opening output")
        .expect("stderr line missing");
    assert_eq!(error_line.level, LogLevel::Error);
}

#[tokio::test]
async fn test_double_start_rejected_and_first_session_untouched() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "#!/bin/sh\necho \"encoding started\"\nsleep 30\n");
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(5));

    supervisor.start(config()).await.unwrap();
    assert!(wait_until(|| supervisor.is_running(), Duration::from_secs(2)).await);

    let second = supervisor.start(config()).await;
    assert!(matches!(second, Err(StreamError::AlreadyRunning)));

    // first session is untouched: still running, only its own Started record
    assert!(supervisor.is_running());
    assert_eq!(recorder.records().len(), 1);

    supervisor.stop().await.unwrap();
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn test_stop_terminates_group_and_finalizes_once() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "#!/bin/sh\necho \"encoding started\"\nsleep 30\n");
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(5));

    supervisor.start(config()).await.unwrap();
    assert!(wait_until(|| supervisor.is_running(), Duration::from_secs(2)).await);

    let begun = Instant::now();
    supervisor.stop().await.unwrap();
    // cooperative child: exits well before the grace period
    assert!(begun.elapsed() < Duration::from_secs(5));
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert!(!supervisor.is_running());

    let records = recorder.records();
    assert_eq!(records.len(), 2, "exactly one finalized record expected");
    assert_eq!(records[1].status, SessionStatus::Stopped);
    assert!(records[1].end_time.is_some());

    // a second stop is a precondition error, not a duplicate record
    assert!(matches!(supervisor.stop().await, Err(StreamError::NotRunning)));
    assert_eq!(recorder.records().len(), 2);
}

#[tokio::test]
async fn test_forced_kill_after_grace_period() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    // ignores the graceful signal; only the forced group kill ends it
    let script = write_script(
        &dir,
        "#!/bin/sh\ntrap '' TERM\necho ready\nwhile :; do sleep 1; done\n",
    );
    let grace = Duration::from_millis(300);
    let (supervisor, recorder) = supervisor_for(&script, grace);

    supervisor.start(config()).await.unwrap();
    assert!(wait_until(|| supervisor.is_running(), Duration::from_secs(2)).await);
    // wait for the script to confirm its trap is installed before signaling
    assert!(
        wait_until(
            || supervisor
                .drain_logs()
                .iter()
                .any(|e| e.message.contains("ready")),
            Duration::from_secs(2)
        )
        .await,
        "encoder script never reported readiness"
    );

    let begun = Instant::now();
    supervisor.stop().await.unwrap();
    let elapsed = begun.elapsed();
    assert!(
        elapsed >= grace,
        "forced kill was issued before the grace period elapsed: {elapsed:?}"
    );
    assert!(
        elapsed < grace + Duration::from_secs(3),
        "forced kill took too long after the grace period: {elapsed:?}"
    );

    assert_eq!(supervisor.state(), SupervisorState::Idle);
    let records = recorder.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].status, SessionStatus::Stopped);

    // the escalation is surfaced as a log event, not a caller error
    let logs = supervisor.drain_logs();
    assert!(logs
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("grace period")));
}

#[tokio::test]
async fn test_emergency_stop_forces_idle() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "#!/bin/sh\nsleep 30\n");
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(5));

    supervisor.start(config()).await.unwrap();
    assert!(wait_until(|| supervisor.is_running(), Duration::from_secs(2)).await);

    supervisor.emergency_stop().await;
    assert_eq!(supervisor.state(), SupervisorState::Idle);
    assert!(!supervisor.is_running());
    assert_eq!(recorder.records().last().unwrap().status, SessionStatus::Stopped);

    // idempotent when nothing is running
    supervisor.emergency_stop().await;
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn test_emergency_stop_unblocks_on_silent_but_alive_encoder() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    // closes both output pipes, then keeps running
    let script = write_script(&dir, "#!/bin/sh\nexec 1<&- 2<&-\nsleep 1000\n");
    // grace long enough that the reader is still parked on the exit status
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(60));

    supervisor.start(config()).await.unwrap();
    // give the reader time to hit end-of-output and start waiting
    tokio::time::sleep(Duration::from_millis(500)).await;

    let emergency = tokio::time::timeout(Duration::from_secs(3), supervisor.emergency_stop());
    assert!(
        emergency.await.is_ok(),
        "emergency stop blocked on a child that closed its pipes but stayed alive"
    );
    assert_eq!(supervisor.state(), SupervisorState::Idle);

    let records = recorder.records();
    let last = records.last().unwrap();
    assert_eq!(last.status, SessionStatus::Stopped);
    assert!(last.end_time.is_some());
}

#[tokio::test]
async fn test_silent_but_alive_encoder_is_killed_after_grace() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "#!/bin/sh\nexec 1<&- 2<&-\nsleep 1000\n");
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_millis(300));

    supervisor.start(config()).await.unwrap();
    assert!(
        wait_until(
            || supervisor.state() == SupervisorState::Idle && recorder.records().len() == 2,
            Duration::from_secs(5)
        )
        .await,
        "session did not finalize after the encoder went silent"
    );

    let records = recorder.records();
    assert_eq!(records[1].status, SessionStatus::Failed);
    assert!(records[1].end_time.is_some());

    let logs = supervisor.drain_logs();
    assert!(logs
        .iter()
        .any(|e| e.level == LogLevel::Error && e.message.contains("kept running")));
}

#[tokio::test]
async fn test_restart_after_completion() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "#!/bin/sh\necho \"frame=10 fps=24.0 bitrate=1000.0kbits/s size=1MB\"\nexit 0\n",
    );
    let (supervisor, recorder) = supervisor_for(&script, Duration::from_secs(5));

    supervisor.start(config()).await.unwrap();
    assert!(
        wait_until(
            || supervisor.state() == SupervisorState::Idle && recorder.records().len() == 2,
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(supervisor.snapshot_stats().frames_processed, 10);

    supervisor.start(config()).await.unwrap();
    assert!(
        wait_until(
            || supervisor.state() == SupervisorState::Idle && recorder.records().len() == 4,
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(recorder.records()[3].status, SessionStatus::Completed);
}
