//! # Scene Detection Module
//!
//! Rileva i cambi di scena con il filtro `select` di ffmpeg sullo scene score.
//!
//! ## Funzionamento:
//! - `select='gt(scene,T)',showinfo` scrive su stderr una riga `pts_time:`
//!   per ogni frame che supera la soglia
//! - Ogni taglio chiude il segmento aperto dal precedente (il primo parte da 0);
//!   la coda dopo l'ultimo taglio non viene chiusa
//! - Lo score di ogni segmento è la soglia usata (showinfo non riporta lo score)

use crate::args;
use crate::error::{PipelineError, Result};
use crate::models::{SceneSegment, UNKNOWN_FRAME};
use crate::platform::ExternalTools;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.4;

fn pts_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"pts_time:\s*([0-9]+(?:\.[0-9]+)?)").expect("pts_time pattern is valid"))
}

/// Detect scene cuts and return the segments between them, in time order.
///
/// Zero cuts is a valid result (empty vec). The tail of the video after the
/// last cut is not closed here.
pub async fn detect_scenes(tools: &ExternalTools, video_path: &Path, threshold: f64) -> Result<Vec<SceneSegment>> {
    let filter = format!("select='gt(scene,{})',showinfo", threshold);
    let args = args![
        "-hide_banner",
        "-nostdin",
        "-i",
        video_path.to_string_lossy(),
        "-filter:v",
        filter,
        "-f",
        "null",
        "-",
    ];

    let output = Command::new(&tools.ffmpeg)
        .args(&args)
        .output()
        .await
        .map_err(|e| PipelineError::SceneDetection(format!("Failed to run ffmpeg: {}", e)))?;

    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(PipelineError::SceneDetection(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            last_lines(&stderr, 5)
        )));
    }

    let timestamps = parse_scene_timestamps(&stderr);
    debug!("Detected {} scene changes in {}", timestamps.len(), video_path.display());

    Ok(segments_from_timestamps(&timestamps, threshold))
}

/// Every `pts_time:` value in the showinfo diagnostics, in arrival order
pub fn parse_scene_timestamps(stderr: &str) -> Vec<f64> {
    pts_time_pattern()
        .captures_iter(stderr)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Each timestamp closes a segment opened by the previous one (implicit 0)
pub fn segments_from_timestamps(timestamps: &[f64], threshold: f64) -> Vec<SceneSegment> {
    let mut last_time = 0.0;
    timestamps
        .iter()
        .map(|&time| {
            let segment = SceneSegment {
                start_time: last_time,
                end_time: time.max(last_time),
                frame_number: UNKNOWN_FRAME,
                scene_score: threshold,
            };
            last_time = segment.end_time;
            segment
        })
        .collect()
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(count)..].join("\n")
}
