//! Preview clip assembly

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::options::VideoOptions;
use crate::error::{ProcessingError, ProcessingResult};

/// Videos up to this length are previewed whole.
const FULL_PREVIEW_MAX_SECONDS: f64 = 10.0;
const SEGMENT_COUNT: usize = 5;
const SEGMENT_SECONDS: f64 = 2.0;

/// A `[start, start + duration)` slice of the source, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewSegment {
    pub start: f64,
    pub duration: f64,
}

impl PreviewSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Choose the source slices a preview is made of.
///
/// Short videos yield one segment covering everything. Longer ones yield five
/// two-second segments spread evenly so the last one ends at the very end.
pub fn preview_segments(duration: f64) -> ProcessingResult<Vec<PreviewSegment>> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ProcessingError::Probe(format!(
            "Cannot build a preview for duration {}",
            duration
        )));
    }

    if duration <= FULL_PREVIEW_MAX_SECONDS {
        return Ok(vec![PreviewSegment {
            start: 0.0,
            duration,
        }]);
    }

    let interval = (duration - SEGMENT_SECONDS) / (SEGMENT_COUNT - 1) as f64;
    let segments = (0..SEGMENT_COUNT)
        .map(|i| {
            let start = (i as f64 * interval).clamp(0.0, duration);
            let end = (start + SEGMENT_SECONDS).min(duration);
            PreviewSegment {
                start,
                duration: end - start,
            }
        })
        .collect();
    Ok(segments)
}

/// `-filter_complex` graph that cuts, rebases, joins and scales the segments.
/// The result is labelled `[out]`.
pub(crate) fn filter_graph(segments: &[PreviewSegment], width: u32, height: u32) -> String {
    let trim = |segment: &PreviewSegment| {
        format!(
            "trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS",
            segment.start,
            segment.end()
        )
    };

    match segments {
        [single] => format!("[0:v]{},scale={}:{}[out]", trim(single), width, height),
        _ => {
            let n = segments.len();
            let mut graph = format!("[0:v]split={}", n);
            for i in 0..n {
                graph.push_str(&format!("[s{}]", i));
            }
            for (i, segment) in segments.iter().enumerate() {
                graph.push_str(&format!(";[s{}]{}[v{}]", i, trim(segment), i));
            }
            graph.push(';');
            for i in 0..n {
                graph.push_str(&format!("[v{}]", i));
            }
            graph.push_str(&format!(
                "concat=n={}:v=1:a=0,scale={}:{}[out]",
                n, width, height
            ));
            graph
        }
    }
}

/// Render the preview of `input` into `output` as H.264 MP4 without audio.
#[tracing::instrument(skip(options, segments), fields(
    process.executable.name = "ffmpeg",
    process.executable.path = %options.ffmpeg_path(),
    ffmpeg.operation = "preview",
    segment_count = segments.len()
))]
pub(crate) async fn render_preview(
    options: &VideoOptions,
    input: &Path,
    output: &Path,
    segments: &[PreviewSegment],
) -> ProcessingResult<()> {
    let start = std::time::Instant::now();
    let (width, height) = options.preview_size();

    let mut args = vec!["-y".to_string(), "-i".to_string(), input.to_string_lossy().to_string()];
    args.extend_from_slice(&[
        "-filter_complex".to_string(),
        filter_graph(segments, width, height),
        "-map".to_string(),
        "[out]".to_string(),
    ]);
    args.extend_from_slice(&["-c:v".to_string(), "libx264".to_string()]);
    args.extend_from_slice(&["-crf".to_string(), options.crf().to_string()]);
    args.extend_from_slice(&["-preset".to_string(), options.preset().to_string()]);
    args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);
    args.push("-an".to_string());
    args.push(output.to_string_lossy().to_string());

    let result = Command::new(options.ffmpeg_path())
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProcessingError::Encode {
            artifact: "preview".to_string(),
            message: format!("Failed to execute ffmpeg: {}", e),
        })?;

    if !result.status.success() {
        return Err(ProcessingError::Encode {
            artifact: "preview".to_string(),
            message: String::from_utf8_lossy(&result.stderr).to_string(),
        });
    }

    tracing::debug!(
        duration_ms = start.elapsed().as_millis(),
        "Preview rendered"
    );
    Ok(())
}
