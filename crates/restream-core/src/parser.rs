use crate::events::LogLevel;
use crate::stats::StatsUpdate;

/// Unit suffix the encoder attaches to bitrate values
const BITRATE_UNIT: &str = "kbits/s";

/// Result of classifying and parsing one line of encoder output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineReport {
    /// Partial stats update, present only for metrics lines that yielded at
    /// least one recognized field
    pub update: Option<StatsUpdate>,
    pub level: LogLevel,
    /// Per-token parse failures, recovered locally; the reader loop turns
    /// each into an `ERROR`-severity log event
    pub errors: Vec<String>,
}

/// A metrics line carries all three progress tokens
fn is_metrics_line(line: &str) -> bool {
    line.contains("frame=") && line.contains("fps=") && line.contains("bitrate=")
}

fn classify(line: &str, metrics: bool) -> LogLevel {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        LogLevel::Error
    } else if metrics {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Parse one line of raw encoder output
///
/// Tokens are whitespace-delimited `key=value` pairs. Unrecognized keys are
/// skipped silently; a malformed value for a recognized key is skipped and
/// reported in `errors` without discarding siblings on the same line.
pub fn parse_line(line: &str) -> LineReport {
    let metrics = is_metrics_line(line);
    let level = classify(line, metrics);

    if !metrics {
        return LineReport {
            update: None,
            level,
            errors: Vec::new(),
        };
    }

    let mut update = StatsUpdate::default();
    let mut errors = Vec::new();

    for token in line.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "frame" => match value.parse::<u64>() {
                Ok(frames) => update.frames_processed = Some(frames),
                Err(e) => errors.push(format!("bad frame token {value:?}: {e}")),
            },
            "fps" => match value.parse::<f64>() {
                Ok(fps) => update.fps = Some(fps),
                Err(e) => errors.push(format!("bad fps token {value:?}: {e}")),
            },
            "bitrate" => {
                // A bitrate without the expected unit is ignored for this line
                if let Some(number) = value.strip_suffix(BITRATE_UNIT) {
                    match number.parse::<f64>() {
                        Ok(bitrate) => update.bitrate_kbps = Some(bitrate),
                        Err(e) => errors.push(format!("bad bitrate token {value:?}: {e}")),
                    }
                }
            }
            "size" => update.output_size = Some(value.to_string()),
            _ => {}
        }
    }

    LineReport {
        update: (!update.is_empty()).then_some(update),
        level,
        errors,
    }
}
