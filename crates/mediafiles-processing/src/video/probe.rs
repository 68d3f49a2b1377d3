//! ffprobe invocation and output parsing

use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;

use crate::error::{ProcessingError, ProcessingResult};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// What the processor needs to know about a video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    /// Seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

fn parse_seconds(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite())
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub(crate) fn parse_probe_output(stdout: &[u8]) -> ProcessingResult<VideoMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ProcessingError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProcessingError::Probe("No video stream found".to_string()))?;

    let duration = parse_seconds(probe.format.as_ref().and_then(|f| f.duration.as_ref()))
        .or_else(|| parse_seconds(stream.duration.as_ref()))
        .ok_or_else(|| ProcessingError::Probe("Could not parse duration".to_string()))?;

    let width = stream
        .width
        .ok_or_else(|| ProcessingError::Probe("Could not parse width".to_string()))?;
    let height = stream
        .height
        .ok_or_else(|| ProcessingError::Probe("Could not parse height".to_string()))?;

    Ok(VideoMetadata {
        duration,
        width,
        height,
        codec: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

#[tracing::instrument(skip(ffprobe_path), fields(
    process.executable.name = "ffprobe",
    process.executable.path = %ffprobe_path,
    ffmpeg.operation = "probe"
))]
pub async fn probe_video(ffprobe_path: &str, video_path: &Path) -> ProcessingResult<VideoMetadata> {
    let start = std::time::Instant::now();

    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(video_path)
        .output()
        .await
        .map_err(|e| ProcessingError::Probe(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(ProcessingError::Probe(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let metadata = parse_probe_output(&output.stdout)?;

    tracing::info!(
        duration_ms = start.elapsed().as_millis(),
        video_duration = metadata.duration,
        width = metadata.width,
        height = metadata.height,
        codec = %metadata.codec,
        "Video probe completed"
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_video_stream() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "duration": "12.000000"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let metadata = parse_probe_output(json).unwrap();
        assert_eq!(metadata.duration, 12.48);
        assert_eq!((metadata.width, metadata.height), (1920, 1080));
        assert_eq!(metadata.codec, "h264");
    }

    #[test]
    fn falls_back_to_stream_duration() {
        let json = br#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "duration": "4.5"}],
            "format": {"duration": "N/A"}
        }"#;
        let metadata = parse_probe_output(json).unwrap();
        assert_eq!(metadata.duration, 4.5);
        assert_eq!(metadata.codec, "unknown");
    }

    #[test]
    fn audio_only_is_probe_error() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ProcessingError::Probe(_))
        ));
    }

    #[test]
    fn garbage_is_probe_error() {
        assert!(matches!(
            parse_probe_output(b"not json"),
            Err(ProcessingError::Probe(_))
        ));
    }
}
