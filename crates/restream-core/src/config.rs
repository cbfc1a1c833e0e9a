use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Output resolution for the encoded stream
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep the source resolution (no scale filter)
    #[default]
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Resolution {
    /// The scale filter argument for this resolution, if one applies
    pub fn scale_filter(&self) -> Option<&'static str> {
        match self {
            Resolution::Original => None,
            Resolution::P1080 => Some("scale=1920:1080"),
            Resolution::P720 => Some("scale=1280:720"),
            Resolution::P480 => Some("scale=854:480"),
        }
    }
}

/// Configuration for a single streaming session
///
/// Immutable once a session has started: the supervisor copies what it needs
/// into the encoder argument list at spawn time and never mutates or persists
/// the config itself.
#[derive(Default, Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into, strip_option))]
pub struct StreamConfig {
    pub name: String,
    /// Path to the media source the encoder loops over
    pub video_path: PathBuf,
    /// Destination stream key. Never logged or persisted raw; only its
    /// digest leaves the supervisor (see `hash_stream_key`).
    pub stream_key: String,
    /// Target video bitrate in kbps
    #[serde(default = "default_bitrate_kbps")]
    #[builder(default = "default_bitrate_kbps()")]
    pub bitrate_kbps: u32,
    #[serde(default)]
    #[builder(default)]
    pub resolution: Resolution,
    /// Portrait 9:16 output. Takes precedence over `resolution`.
    #[serde(default)]
    #[builder(default)]
    pub shorts_mode: bool,
}

impl StreamConfig {
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.video_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("video_path must not be empty"));
        }

        if self.stream_key.is_empty() {
            return Err(anyhow::anyhow!("stream_key must not be empty"));
        }

        if self.bitrate_kbps == 0 {
            return Err(anyhow::anyhow!("bitrate_kbps must be greater than zero"));
        }

        if self.bitrate_kbps > 8_000 {
            return Err(anyhow::anyhow!("bitrate_kbps should not exceed 8000 kbps"));
        }

        Ok(())
    }
}

/// Supervisor tuning knobs, fixed at construction
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct SupervisorOptions {
    /// Executable name of the external encoder
    #[builder(default = "default_encoder_command()")]
    pub encoder_command: String,
    /// How long `stop()` waits after the graceful signal before escalating
    /// to a forced kill of the process group
    #[builder(default = "default_grace_period()")]
    pub grace_period: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            encoder_command: default_encoder_command(),
            grace_period: default_grace_period(),
        }
    }
}

impl SupervisorOptions {
    pub fn builder() -> SupervisorOptionsBuilder {
        SupervisorOptionsBuilder::default()
    }
}

// Default value functions for serde and the builders
fn default_bitrate_kbps() -> u32 {
    2_500
}
fn default_encoder_command() -> String {
    "ffmpeg".to_string()
}
fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}
