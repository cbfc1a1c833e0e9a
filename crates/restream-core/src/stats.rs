use serde::{Deserialize, Serialize};

/// Runtime metrics extracted from the encoder's progress output
///
/// Mutated only by the reader task; every other party sees snapshot clones,
/// never a live reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Total frames processed, monotonically non-decreasing
    pub frames_processed: u64,
    /// Instantaneous frames per second
    pub fps: f64,
    /// Instantaneous output bitrate in kbps
    pub bitrate_kbps: f64,
    /// Cumulative output size, verbatim as the encoder printed it
    pub output_size: String,
}

/// Partial stats update parsed from a single metrics line
///
/// Fields are applied independently so one malformed token on a line never
/// discards its successfully parsed siblings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsUpdate {
    pub frames_processed: Option<u64>,
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub output_size: Option<String>,
}

impl StatsUpdate {
    pub fn is_empty(&self) -> bool {
        self.frames_processed.is_none()
            && self.fps.is_none()
            && self.bitrate_kbps.is_none()
            && self.output_size.is_none()
    }

    /// Apply this update field-by-field
    pub fn apply(&self, stats: &mut RuntimeStats) {
        if let Some(frames) = self.frames_processed {
            stats.frames_processed = frames;
        }
        if let Some(fps) = self.fps {
            stats.fps = fps;
        }
        if let Some(bitrate) = self.bitrate_kbps {
            stats.bitrate_kbps = bitrate;
        }
        if let Some(ref size) = self.output_size {
            stats.output_size = size.clone();
        }
    }
}
