use crate::config::StreamConfig;

/// Ingest endpoint the stream key is appended to
pub const RTMP_ENDPOINT: &str = "rtmp://a.rtmp.youtube.com/live2/";

/// Scale filter used when shorts mode is enabled (portrait 9:16)
const SHORTS_SCALE: &str = "scale=720:1280";

/// The destination URL for a session
pub fn output_url(config: &StreamConfig) -> String {
    format!("{RTMP_ENDPOINT}{}", config.stream_key)
}

/// Build the encoder argument list for a session
///
/// Deterministic: the same config always yields the same argv. The keyframe
/// interval, audio codec/bitrate, and output container are fixed by the
/// ingest endpoint's requirements.
pub fn build_args(config: &StreamConfig) -> Vec<String> {
    let bitrate = config.bitrate_kbps;
    let mut args: Vec<String> = vec![
        "-re".into(),
        "-stream_loop".into(),
        "-1".into(),
        "-i".into(),
        config.video_path.to_string_lossy().into_owned(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-b:v".into(),
        format!("{bitrate}k"),
        "-maxrate".into(),
        format!("{bitrate}k"),
        "-bufsize".into(),
        format!("{}k", bitrate * 2),
        "-g".into(),
        "60".into(),
        "-keyint_min".into(),
        "60".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-f".into(),
        "flv".into(),
    ];

    // Shorts mode wins over the resolution setting
    if config.shorts_mode {
        args.push("-vf".into());
        args.push(SHORTS_SCALE.into());
    } else if let Some(filter) = config.resolution.scale_filter() {
        args.push("-vf".into());
        args.push(filter.into());
    }

    args.push(output_url(config));
    args
}
