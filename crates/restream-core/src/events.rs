use crate::stats::RuntimeStats;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// How many already-drained log events `LogHistory` retains
pub const LOG_HISTORY_CAP: usize = 100;

/// Severity of one line of encoder output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[default]
    Info,
    Debug,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One line of encoder output, immutable once pushed into the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub level: LogLevel,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
            level,
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// Single-producer, poll-draining conduit between the reader task and any
/// number of consumers
///
/// Log events are an ordered queue; stats snapshots coalesce, keeping only
/// the newest undrained value. Neither side ever blocks beyond the short
/// critical sections below.
#[derive(Debug, Default)]
pub struct EventChannel {
    logs: Mutex<VecDeque<LogEvent>>,
    latest_stats: Mutex<Option<RuntimeStats>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_log(&self, event: LogEvent) {
        self.logs.lock().unwrap().push_back(event);
    }

    /// Replace-last semantics: an undrained snapshot is overwritten
    pub fn push_stats(&self, snapshot: RuntimeStats) {
        *self.latest_stats.lock().unwrap() = Some(snapshot);
    }

    /// Remove and return all pending log events in emission order
    pub fn drain_logs(&self) -> Vec<LogEvent> {
        self.logs.lock().unwrap().drain(..).collect()
    }

    /// Return and clear the newest stats snapshot, `None` if nothing arrived
    /// since the last drain
    pub fn drain_stats(&self) -> Option<RuntimeStats> {
        self.latest_stats.lock().unwrap().take()
    }
}

/// Consumer-side retention of already-drained log events
///
/// Capped ring so long-running sessions stay bounded; the cap never causes
/// an unread producer event to be discarded.
#[derive(Debug)]
pub struct LogHistory {
    entries: VecDeque<LogEvent>,
    cap: usize,
}

impl Default for LogHistory {
    fn default() -> Self {
        Self::new(LOG_HISTORY_CAP)
    }
}

impl LogHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = LogEvent>) {
        for event in events {
            if self.entries.len() == self.cap {
                self.entries.pop_front();
            }
            self.entries.push_back(event);
        }
    }

    /// The most recent `n` retained events, oldest first
    pub fn recent(&self, n: usize) -> Vec<LogEvent> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_drain_in_emission_order() {
        let channel = EventChannel::new();
        channel.push_log(LogEvent::new("first", LogLevel::Info));
        channel.push_log(LogEvent::new("second", LogLevel::Debug));
        channel.push_log(LogEvent::new("third", LogLevel::Error));

        let drained = channel.drain_logs();
        let messages: Vec<_> = drained.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_drained_logs_are_not_duplicated() {
        let channel = EventChannel::new();
        channel.push_log(LogEvent::new("only", LogLevel::Info));
        assert_eq!(channel.drain_logs().len(), 1);
        assert!(channel.drain_logs().is_empty());
        assert!(channel.drain_logs().is_empty());
    }

    #[test]
    fn test_stats_coalesce_to_latest() {
        let channel = EventChannel::new();
        channel.push_stats(RuntimeStats {
            frames_processed: 10,
            ..Default::default()
        });
        channel.push_stats(RuntimeStats {
            frames_processed: 20,
            ..Default::default()
        });

        let snapshot = channel.drain_stats().unwrap();
        assert_eq!(snapshot.frames_processed, 20);
        // second drain with no intervening push reports no update
        assert!(channel.drain_stats().is_none());
    }

    #[test]
    fn test_history_cap_drops_oldest() {
        let mut history = LogHistory::new(3);
        for i in 0..5 {
            history.extend([LogEvent::new(format!("line {i}"), LogLevel::Info)]);
        }
        assert_eq!(history.len(), 3);
        let recent = history.recent(10);
        assert_eq!(recent.first().unwrap().message, "line 2");
        assert_eq!(recent.last().unwrap().message, "line 4");
    }

    #[test]
    fn test_recent_projection() {
        let mut history = LogHistory::default();
        history.extend((0..30).map(|i| LogEvent::new(format!("line {i}"), LogLevel::Info)));
        let recent = history.recent(20);
        assert_eq!(recent.len(), 20);
        assert_eq!(recent.first().unwrap().message, "line 10");
    }

    #[test]
    fn test_log_event_display() {
        let event = LogEvent::new("encoder exited", LogLevel::Error);
        let rendered = format!("{event}");
        assert!(rendered.contains("ERROR"));
        assert!(rendered.contains("encoder exited"));
    }
}
