//! # Keyframe Sampling Module
//!
//! Sceglie i timestamp da campionare e ne estrae un frame ciascuno con ffmpeg.
//!
//! ## Politica di campionamento:
//! 1. Base: l'inizio di ogni scena rilevata
//! 2. Con meno di 2 scene: sweep a intervallo fisso da 0 alla durata
//! 3. Deduplica e ordina in modo crescente
//! 4. Se si supera il massimo: sottocampionamento uniforme con
//!    stride = ceil(count / max), mai troncamento
//!
//! ## Estrazione:
//! Un'invocazione ffmpeg per timestamp, in sequenza. I file sono nominati per
//! indice ordinale (`frame_0000.png`). Il fallimento di un singolo frame
//! fa fallire l'intero stadio.

use crate::args;
use crate::error::{PipelineError, Result};
use crate::models::{Keyframe, SceneSegment, UNKNOWN_FRAME};
use crate::platform::ExternalTools;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_KEYFRAME_INTERVAL: f64 = 2.0;
pub const DEFAULT_MAX_KEYFRAMES: usize = 50;

/// Sweep points past this are indistinguishable as f64 anyway
const MAX_SWEEP_POINTS: u64 = 1 << 53;

/// Capped, deduplicated, ascending sample timestamps.
///
/// The interval sweep is never materialized: a corrupt container reporting a
/// huge duration costs `O(max_keyframes)`, not `O(duration / interval)`.
pub fn sample_timestamps(scenes: &[SceneSegment], duration: f64, interval: f64, max_keyframes: usize) -> Vec<f64> {
    let mut starts: Vec<f64> = scenes
        .iter()
        .map(|s| s.start_time)
        .filter(|t| t.is_finite() && *t >= 0.0)
        .collect();
    starts.sort_by(|a, b| a.total_cmp(b));
    starts.dedup();

    let sweep_len = if scenes.len() < 2 && interval > 0.0 && duration.is_finite() {
        points_below(duration, interval, MAX_SWEEP_POINTS)
    } else {
        0
    };
    let sweep_at = |i: u64| i as f64 * interval;

    // Scene starts that do not coincide with a sweep point, with the number
    // of sweep points before each
    let extras: Vec<(f64, u64)> = starts
        .into_iter()
        .filter(|&t| {
            let i = (t / interval).round() as u64;
            ![i.saturating_sub(1), i, i.saturating_add(1)]
                .iter()
                .any(|&j| j < sweep_len && sweep_at(j) == t)
        })
        .map(|t| (t, points_below(t, interval, sweep_len)))
        .collect();

    let total = sweep_len + extras.len() as u64;
    let stride = if max_keyframes > 0 && total > max_keyframes as u64 {
        total.div_ceil(max_keyframes as u64)
    } else {
        1
    };

    // k-th element of the merged sequence, for k = 0, stride, 2 * stride, ...
    let mut timestamps = Vec::new();
    let mut extra = 0;
    let mut k = 0u64;
    while k < total {
        while extra < extras.len() && extras[extra].1 + (extra as u64) < k {
            extra += 1;
        }
        match extras.get(extra) {
            Some(&(t, before)) if before + extra as u64 == k => timestamps.push(t),
            _ => timestamps.push(sweep_at(k - extra as u64)),
        }
        k += stride;
    }

    timestamps
}

/// How many of `0, interval, 2 * interval, ...` are strictly below `limit`, at most `cap`
fn points_below(limit: f64, interval: f64, cap: u64) -> u64 {
    let estimate = (limit / interval).ceil();
    if !(estimate > 0.0) {
        return 0;
    }
    if estimate >= cap as f64 {
        return cap;
    }

    let mut count = estimate as u64;
    while count > 0 && (count - 1) as f64 * interval >= limit {
        count -= 1;
    }
    while count < cap && count as f64 * interval < limit {
        count += 1;
    }
    count
}

/// `frame_0007.png` style name for the i-th sample
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:04}.png", index)
}

/// Extract one still per timestamp into `frames_dir`, sequentially
pub async fn extract_keyframes(
    tools: &ExternalTools,
    video_path: &Path,
    frames_dir: &Path,
    timestamps: &[f64],
) -> Result<Vec<Keyframe>> {
    tokio::fs::create_dir_all(frames_dir).await?;

    let mut keyframes = Vec::with_capacity(timestamps.len());

    for (index, &timestamp) in timestamps.iter().enumerate() {
        let output_path = frames_dir.join(frame_file_name(index));
        extract_frame(tools, video_path, timestamp, &output_path).await?;

        keyframes.push(Keyframe {
            timestamp,
            frame_number: UNKNOWN_FRAME,
            file_path: output_path,
        });
    }

    debug!("Extracted {} keyframes into {}", keyframes.len(), frames_dir.display());
    Ok(keyframes)
}

async fn extract_frame(tools: &ExternalTools, video_path: &Path, timestamp: f64, output_path: &Path) -> Result<()> {
    // -ss before -i seeks on the demuxer, which is much faster than decoding up to t
    let args = args![
        "-hide_banner",
        "-nostdin",
        "-loglevel",
        "error",
        "-ss",
        timestamp,
        "-i",
        video_path.to_string_lossy(),
        "-frames:v",
        1,
        "-q:v",
        2,
        output_path.to_string_lossy(),
        "-y",
    ];

    let output = Command::new(&tools.ffmpeg)
        .args(&args)
        .output()
        .await
        .map_err(|e| PipelineError::KeyframeExtraction {
            timestamp,
            message: format!("Failed to run ffmpeg: {}", e),
        })?;

    if !output.status.success() {
        return Err(PipelineError::KeyframeExtraction {
            timestamp,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    // ffmpeg exits 0 without writing anything when the seek lands past the last frame
    if !tokio::fs::try_exists(output_path).await.unwrap_or(false) {
        return Err(PipelineError::KeyframeExtraction {
            timestamp,
            message: format!("ffmpeg produced no frame at {}", output_path.display()),
        });
    }

    Ok(())
}
