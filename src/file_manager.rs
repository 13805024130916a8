//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file della pipeline.
//!
//! ## Responsabilità:
//! - Discovery dei video nella directory di input (dotfile ignorati)
//! - Creazione delle directory di lavoro mancanti all'avvio
//! - Archiviazione degli originali in `processed/` o `failed/`
//!   (mai sovrascrivere: suffisso univoco in caso di collisione)
//! - Log append-only degli errori terminali (`failed/error.log`)
//! - Pulizia delle directory `temp_frames` delle esecuzioni precedenti
//!
//! ## Formati supportati:
//! - **Video**: MP4, MOV, AVI, MKV, WebM, M4V, FLV (case-insensitive)
//!
//! ## Esempio:
//! ```rust,no_run
//! # use video_blueprint::file_manager::FileManager;
//! # use std::path::Path;
//! # fn main() -> anyhow::Result<()> {
//! for video in FileManager::find_videos(Path::new("inputs"))? {
//!     println!("{}", video.display());
//! }
//! # Ok(())
//! # }
//! ```

use crate::analyzer::FRAMES_DIR_NAME;
use crate::sanitizer::is_sanitized_copy;
use crate::utils::unique_token;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v", "flv"];

/// Name of the append-only log inside the failed archive
pub const ERROR_LOG_NAME: &str = "error.log";

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Check if a file is a video the pipeline accepts
    pub fn is_video(path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
            })
            .unwrap_or(false)
    }

    /// Dotfiles are editor/OS artifacts, never input
    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    /// A file the queue should pick up: a visible video that is not one of our sanitized copies
    pub fn is_candidate(path: &Path) -> bool {
        Self::is_video(path) && !Self::is_hidden(path) && !is_sanitized_copy(path)
    }

    /// Candidate videos directly inside `dir`, oldest modification first
    pub fn find_videos(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(SystemTime, PathBuf)> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| Self::is_candidate(e.path()))
            .map(|e| {
                let modified = e
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, e.into_path())
            })
            .collect();

        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// File names of the videos already sitting in an archive directory
    pub fn list_video_names(dir: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && Self::is_video(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        names.sort();
        names
    }

    /// Create every missing working directory
    pub async fn ensure_dirs(dirs: &[&Path]) -> Result<()> {
        for dir in dirs {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create directory {}", dir.display()))?;
                info!("📁 Created missing directory: {}", dir.display());
            }
        }
        Ok(())
    }

    /// Move `file` into `archive_dir` without overwriting; returns the final path
    pub async fn archive_file(file: &Path, archive_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(archive_dir).await?;

        let file_name = file
            .file_name()
            .with_context(|| format!("Not a file path: {}", file.display()))?;
        let mut dest = archive_dir.join(file_name);

        if dest.exists() {
            dest = Self::unique_destination(archive_dir, file);
        }

        Self::move_file(file, &dest).await?;
        debug!("Archived {} -> {}", file.display(), dest.display());
        Ok(dest)
    }

    /// `<stem>_<token>.<ext>` in `dir`, first name not already taken
    fn unique_destination(dir: &Path, file: &Path) -> PathBuf {
        let stem = file.file_stem().unwrap_or_default().to_string_lossy();
        let ext = file
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut token = unique_token();
        loop {
            let candidate = dir.join(format!("{}_{}{}", stem, token, ext));
            if !candidate.exists() {
                return candidate;
            }
            token += 1;
        }
    }

    /// Rename, falling back to copy + delete across filesystems
    async fn move_file(from: &Path, to: &Path) -> Result<()> {
        if fs::rename(from, to).await.is_ok() {
            return Ok(());
        }

        fs::copy(from, to)
            .await
            .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
        fs::remove_file(from).await?;
        Ok(())
    }

    /// Append `[<ISO-8601>] <name>: <error>` to the failed archive's log
    pub async fn append_error_log(failed_dir: &Path, file_name: &str, error: &str) -> Result<()> {
        fs::create_dir_all(failed_dir).await?;

        let entry = format!(
            "[{}] {}: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            file_name,
            error
        );

        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(failed_dir.join(ERROR_LOG_NAME))
            .await?;
        log.write_all(entry.as_bytes()).await?;
        log.flush().await?;
        Ok(())
    }

    /// Remove `temp_frames/` under every item dir of `output_dir` except `keep`.
    ///
    /// Returns the number of directories removed. Failures are logged and skipped.
    pub async fn reclaim_temp_frames(output_dir: &Path, keep: Option<&Path>) -> usize {
        let Ok(entries) = std::fs::read_dir(output_dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let item_dir = entry.path();
            if !item_dir.is_dir() || keep.is_some_and(|k| k == item_dir) {
                continue;
            }

            let frames_dir = item_dir.join(FRAMES_DIR_NAME);
            if !frames_dir.is_dir() {
                continue;
            }

            match fs::remove_dir_all(&frames_dir).await {
                Ok(()) => {
                    debug!("🧹 Removed {}", frames_dir.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", frames_dir.display(), e),
            }
        }

        removed
    }
}
