//! # Metadata Probe Module
//!
//! Estrae i metadata di container e stream video tramite ffprobe.
//!
//! ## Responsabilità:
//! - Invoca `ffprobe -print_format json -show_format -show_streams`
//! - Seleziona il primo stream con `codec_type == "video"`
//! - Normalizza valori anomali (frame rate fuori range, bitrate assente)
//!
//! ## Frame rate:
//! 1. `avg_frame_rate` (affidabile per VFR)
//! 2. `r_frame_rate` se il primo è non finito, <= 0 o > 120
//! 3. 30 fps con warning se anche il fallback è fuori range
//!
//! Le frazioni (`30000/1001`) sono parsate come razionali espliciti.

use crate::error::{PipelineError, Result};
use crate::models::VideoMetadata;
use crate::platform::ExternalTools;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

pub const MAX_PLAUSIBLE_FPS: f64 = 120.0;
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Run ffprobe on a file and extract its video metadata
pub async fn probe_video(tools: &ExternalTools, video_path: &Path) -> Result<VideoMetadata> {
    debug!("Probing {}", video_path.display());

    let output = Command::new(&tools.ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(video_path)
        .output()
        .await
        .map_err(|e| PipelineError::Probe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(PipelineError::Probe(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's JSON document into `VideoMetadata`
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoMetadata> {
    let probe: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PipelineError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .unwrap_or_default()
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipelineError::Probe("No video stream found".to_string()))?;

    let width = positive_dimension(stream.width, "width")?;
    let height = positive_dimension(stream.height, "height")?;

    let fps = resolve_frame_rate(stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref());

    let format = probe.format;
    let duration = format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| parse_seconds(stream.duration.as_deref()))
        .ok_or_else(|| PipelineError::Probe("Container reports no usable duration".to_string()))?;

    let bitrate = format
        .as_ref()
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.trim().parse::<u64>().ok());

    Ok(VideoMetadata {
        duration,
        fps,
        width,
        height,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
        bitrate,
    })
}

fn positive_dimension(value: Option<i64>, field: &str) -> Result<u32> {
    value
        .filter(|v| *v > 0)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| PipelineError::Probe(format!("Video stream has no valid {}", field)))
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse a frame rate such as `30000/1001`, `25/1` or `29.97`.
///
/// A zero denominator yields `None` rather than infinity.
pub fn parse_rational(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some((num, den)) = value.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    value.parse().ok()
}

fn plausible_fps(fps: Option<f64>) -> Option<f64> {
    fps.filter(|f| f.is_finite() && *f > 0.0 && *f <= MAX_PLAUSIBLE_FPS)
}

/// Pick a frame rate in (0, 120], preferring the average rate
pub fn resolve_frame_rate(avg_frame_rate: Option<&str>, r_frame_rate: Option<&str>) -> f64 {
    if let Some(fps) = plausible_fps(avg_frame_rate.and_then(parse_rational)) {
        return fps;
    }

    if let Some(fps) = plausible_fps(r_frame_rate.and_then(parse_rational)) {
        debug!("avg_frame_rate {:?} unusable, using r_frame_rate {}", avg_frame_rate, fps);
        return fps;
    }

    warn!(
        "Detected unusual FPS (avg: {:?}, nominal: {:?}). Defaulting to {}.",
        avg_frame_rate, r_frame_rate, DEFAULT_FPS
    );
    DEFAULT_FPS
}
