//! # Video Sanitizer Module
//!
//! Ricodifica un video malformato in un MP4 canonico (H.264 + AAC) da usare
//! come secondo tentativo di analisi.
//!
//! ## Pipeline:
//! 1. Nome univoco accanto all'originale: `<stem>_fixed_<millis>.mp4`
//!    (il token viene incrementato se il file esiste già)
//! 2. `ffmpeg -c:v libx264 -preset fast -c:a aac -movflags +faststart`
//! 3. In caso di errore il file parziale viene rimosso prima di propagare
//!
//! La copia non viene mai cancellata qui: è il chiamante che la elimina dopo
//! l'analisi.

use crate::args;
use crate::error::{PipelineError, Result};
use crate::platform::ExternalTools;
use crate::utils::unique_token;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Marker inserted in the file name of every sanitized copy
pub const SANITIZED_MARKER: &str = "_fixed_";

/// Produces a re-encoded copy of a video that decodes everywhere
#[async_trait]
pub trait Sanitize: Send + Sync {
    async fn sanitize(&self, input_path: &Path) -> Result<PathBuf>;
}

/// ffmpeg-backed sanitizer
#[derive(Debug, Clone)]
pub struct Sanitizer {
    tools: ExternalTools,
}

impl Sanitizer {
    pub fn new(tools: ExternalTools) -> Self {
        Self { tools }
    }

    async fn transcode(&self, input_path: &Path, output_path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.tools.ffmpeg);
        cmd.args(args![
            "-hide_banner",
            "-nostdin",
            "-i",
            input_path.to_string_lossy(),
            "-c:v",
            "libx264",
            "-preset",
            "fast",
            "-c:a",
            "aac",
            "-movflags",
            "+faststart",
            output_path.to_string_lossy(),
            "-y",
        ]);

        if !tracing::enabled!(tracing::Level::DEBUG) {
            cmd.args(["-loglevel", "error"]);
        }

        let start_time = Instant::now();
        let output = cmd
            .output()
            .await
            .map_err(|e| PipelineError::Sanitize(format!("Failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::Sanitize(format!(
                "ffmpeg exited with {} after {:.1}s: {}",
                output.status,
                start_time.elapsed().as_secs_f64(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("Transcode finished in {:.1}s", start_time.elapsed().as_secs_f64());
        Ok(())
    }
}

#[async_trait]
impl Sanitize for Sanitizer {
    async fn sanitize(&self, input_path: &Path) -> Result<PathBuf> {
        let output_path = sanitized_path(input_path, unique_token());
        info!("🩹 Attempting to fix {}", input_path.display());

        if let Err(e) = self.transcode(input_path, &output_path).await {
            if output_path.exists() {
                if let Err(cleanup) = tokio::fs::remove_file(&output_path).await {
                    warn!("Failed to remove partial output {}: {}", output_path.display(), cleanup);
                }
            }
            return Err(e);
        }

        info!("✅ Sanitized copy created: {}", output_path.display());
        Ok(output_path)
    }
}

/// First free `<stem>_fixed_<token>.mp4` next to the input, bumping the token
pub fn sanitized_path(input_path: &Path, token: i64) -> PathBuf {
    let dir = input_path.parent().unwrap_or(Path::new(""));
    let stem = input_path.file_stem().unwrap_or_default().to_string_lossy();

    let mut token = token;
    loop {
        let candidate = dir.join(format!("{}{}{}.mp4", stem, SANITIZED_MARKER, token));
        if candidate != input_path && !candidate.exists() {
            return candidate;
        }
        token += 1;
    }
}

/// True for files this module produced
pub fn is_sanitized_copy(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().contains(SANITIZED_MARKER))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitized_path_is_next_to_input() {
        let path = sanitized_path(Path::new("/videos/My Clip.mov"), 1700000000000);
        assert_eq!(path, PathBuf::from("/videos/My Clip_fixed_1700000000000.mp4"));
    }

    #[test]
    fn test_sanitized_path_skips_existing() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("clip.mp4");
        std::fs::write(temp_dir.path().join("clip_fixed_42.mp4"), b"taken").unwrap();

        let path = sanitized_path(&input, 42);
        assert_eq!(path.file_name().unwrap(), "clip_fixed_43.mp4");
    }

    #[test]
    fn test_sanitized_copies_are_recognized() {
        assert!(is_sanitized_copy(Path::new("in/clip_fixed_1700000000000.mp4")));
        assert!(!is_sanitized_copy(Path::new("in/clip.mp4")));
    }

    #[tokio::test]
    async fn test_failure_leaves_no_partial_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("broken.mp4");
        std::fs::write(&input, b"not a video").unwrap();

        let sanitizer = Sanitizer::new(ExternalTools {
            ffmpeg: "/definitely/not/here/ffmpeg".into(),
            ffprobe: "/definitely/not/here/ffprobe".into(),
        });

        let err = sanitizer.sanitize(&input).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sanitize(_)));

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_sanitized_copy(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
        assert!(input.exists());
    }
}
