//! # Video Analyzer Module
//!
//! Compone gli stadi di analisi in un unico `VideoAnalysisResult`.
//!
//! ## Pipeline (sequenziale):
//! 1. Metadata via ffprobe
//! 2. Scene detection via ffmpeg
//! 3. Campionamento ed estrazione keyframe in `<output>/temp_frames`
//! 4. Palette per ogni keyframe (errori assorbiti)
//! 5. Prompt di replica
//!
//! Probe, scene e keyframe propagano l'errore: è la coda a decidere se
//! ritentare con una copia sanitizzata.

use crate::color_analyzer::ColorAnalyzer;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::keyframes::{extract_keyframes, sample_timestamps};
use crate::models::VideoAnalysisResult;
use crate::platform::ExternalTools;
use crate::probe::probe_video;
use crate::prompt::generate_replication_prompt;
use crate::scene_detector::detect_scenes;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the per-item directory holding extracted stills
pub const FRAMES_DIR_NAME: &str = "temp_frames";

/// Turns one video file into a structured analysis
#[async_trait]
pub trait Analyze: Send + Sync {
    async fn analyze(&self, video_path: &Path, output_dir: &Path) -> Result<VideoAnalysisResult>;
}

/// ffmpeg/ffprobe-backed analyzer
#[derive(Debug, Clone)]
pub struct VideoAnalyzer {
    tools: ExternalTools,
    scene_threshold: f64,
    keyframe_interval: f64,
    max_keyframes: usize,
    colors: ColorAnalyzer,
}

impl VideoAnalyzer {
    pub fn new(tools: ExternalTools, config: &Config) -> Self {
        Self {
            tools,
            scene_threshold: config.scene_threshold,
            keyframe_interval: config.keyframe_interval,
            max_keyframes: config.max_keyframes,
            colors: ColorAnalyzer::new(),
        }
    }

    pub fn frames_dir(output_dir: &Path) -> PathBuf {
        output_dir.join(FRAMES_DIR_NAME)
    }
}

#[async_trait]
impl Analyze for VideoAnalyzer {
    async fn analyze(&self, video_path: &Path, output_dir: &Path) -> Result<VideoAnalysisResult> {
        if !video_path.is_file() {
            return Err(PipelineError::NotFound(video_path.to_path_buf()));
        }

        let frames_dir = Self::frames_dir(output_dir);
        // Frames from an earlier attempt on the same item must not leak into this one
        if frames_dir.exists() {
            tokio::fs::remove_dir_all(&frames_dir).await?;
        }
        tokio::fs::create_dir_all(&frames_dir).await?;

        info!("🔍 Analyzing {}", video_path.display());

        let metadata = probe_video(&self.tools, video_path).await?;
        debug!(
            "Metadata: {}x{} @ {:.3}fps, {:.2}s, codec {}",
            metadata.width, metadata.height, metadata.fps, metadata.duration, metadata.codec
        );

        let scenes = detect_scenes(&self.tools, video_path, self.scene_threshold).await?;

        let timestamps = sample_timestamps(&scenes, metadata.duration, self.keyframe_interval, self.max_keyframes);
        let keyframes = extract_keyframes(&self.tools, video_path, &frames_dir, &timestamps).await?;

        let frame_paths: Vec<PathBuf> = keyframes.iter().map(|k| k.file_path.clone()).collect();
        let color_palettes = self.colors.analyze_frames(&frame_paths).await;

        let prompt = generate_replication_prompt(&metadata, &color_palettes);

        info!(
            "✅ Analysis complete: {} scenes, {} keyframes",
            scenes.len(),
            keyframes.len()
        );

        Ok(VideoAnalysisResult {
            metadata,
            scenes,
            keyframes,
            color_palettes,
            generated_prompt: Some(prompt),
            orchestration: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn analyzer(ffprobe: &str) -> VideoAnalyzer {
        let tools = ExternalTools {
            ffmpeg: "/definitely/not/here/ffmpeg".into(),
            ffprobe: ffprobe.into(),
        };
        VideoAnalyzer::new(tools, &Config::default())
    }

    #[tokio::test]
    async fn test_missing_video_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("ghost.mp4");

        let err = analyzer("ffprobe").analyze(&missing, temp_dir.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(ref p) if p == &missing));
    }

    #[tokio::test]
    async fn test_probe_failure_propagates_and_clears_stale_frames() {
        let temp_dir = TempDir::new().unwrap();
        let video = temp_dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let output_dir = temp_dir.path().join("out");
        let stale = VideoAnalyzer::frames_dir(&output_dir).join("frame_0009.png");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();

        let err = analyzer("/definitely/not/here/ffprobe")
            .analyze(&video, &output_dir)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Probe(_)));
        assert!(!stale.exists());
        assert!(VideoAnalyzer::frames_dir(&output_dir).is_dir());
    }
}
