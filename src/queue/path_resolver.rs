//! # Path Resolution Module
//!
//! Centralizza il calcolo dei path di output per ogni item della coda.
//!
//! ```text
//! <output>/<stem>/analysis.json
//! <output>/<stem>/prompt.txt
//! <output>/<stem>/temp_frames/frame_0000.png
//! ```

use anyhow::Result;
use std::path::{Path, PathBuf};

pub const ANALYSIS_FILE_NAME: &str = "analysis.json";
pub const PROMPT_FILE_NAME: &str = "prompt.txt";

/// Utility per calcolare i path di output in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// `<output>/<stem>` for a queued video
    pub fn item_output_dir(output_dir: &Path, video_path: &Path) -> Result<PathBuf> {
        let stem = video_path
            .file_stem()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", video_path.display()))?;
        Ok(output_dir.join(stem))
    }

    pub fn analysis_path(item_dir: &Path) -> PathBuf {
        item_dir.join(ANALYSIS_FILE_NAME)
    }

    pub fn prompt_path(item_dir: &Path) -> PathBuf {
        item_dir.join(PROMPT_FILE_NAME)
    }

    /// Bare file name used as the item's identity in state and logs
    pub fn file_name(video_path: &Path) -> String {
        video_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| video_path.display().to_string())
    }
}
