use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Terminal (or initial) status of a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Session opened, process spawned
    Started,
    /// Encoder ended on its own with a clean exit
    Completed,
    /// Terminated on caller request
    Stopped,
    /// Encoder exited abnormally or could not be reaped cleanly
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Started)
    }
}

/// Durable record of one stream session, handed to the `HistoryRecorder` at
/// the session's start and end boundaries
///
/// Carries the stream key only as a one-way digest, never raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub config_name: String,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub status: SessionStatus,
    pub video_path: String,
    pub stream_key_hash: String,
}

impl SessionRecord {
    /// Open a new record for a session that just spawned
    pub fn opened(config_name: &str, video_path: &str, stream_key: &str) -> Self {
        Self {
            config_name: config_name.to_string(),
            start_time: Local::now(),
            end_time: None,
            status: SessionStatus::Started,
            video_path: video_path.to_string(),
            stream_key_hash: hash_stream_key(stream_key),
        }
    }

    /// Close the record with a terminal status
    ///
    /// A record with a non-null end time is never re-opened or re-finalized.
    pub fn finalize(&mut self, status: SessionStatus) {
        if self.end_time.is_some() {
            return;
        }
        self.end_time = Some(Local::now());
        self.status = status;
    }

    /// Session duration in whole seconds, zero while still open
    pub fn duration_secs(&self) -> i64 {
        match self.end_time {
            Some(end) => (end - self.start_time).num_seconds().max(0),
            None => 0,
        }
    }
}

/// Non-reversible short digest of the stream key for history display
///
/// SHA-256 truncated to 8 hex characters: stable across runs, unlike a
/// language-builtin hash.
pub fn hash_stream_key(stream_key: &str) -> String {
    if stream_key.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(stream_key.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..8].to_string()
}

/// Durable log of stream sessions, implemented by the persistence layer
///
/// The supervisor calls this at session boundaries and only logs failures;
/// a broken recorder never aborts an in-progress stream.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(&self, record: &SessionRecord) -> Result<()>;
}

/// Recorder that discards everything, for callers without a history store
#[derive(Debug, Default)]
pub struct NullHistoryRecorder;

#[async_trait]
impl HistoryRecorder for NullHistoryRecorder {
    async fn record(&self, _record: &SessionRecord) -> Result<()> {
        Ok(())
    }
}
