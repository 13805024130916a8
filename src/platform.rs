//! # Platform-specific utilities
//!
//! Questo modulo centralizza la risoluzione dei binari esterni (ffmpeg e
//! ffprobe) e la verifica della loro disponibilità.
//!
//! Ordine di risoluzione per ogni tool:
//! 1. Path esplicito in `Config` (`ffmpeg_path`, `ffprobe_path`)
//! 2. Variabile d'ambiente (`FFMPEG_PATH`, `FFPROBE_PATH`)
//! 3. Nome del comando, cercato nel PATH (`.exe` su Windows)

use crate::config::Config;
use crate::error::{PipelineError, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Resolved locations of the external media tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ExternalTools {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg: resolve_tool(config.ffmpeg_path.as_deref(), "FFMPEG_PATH", "ffmpeg"),
            ffprobe: resolve_tool(config.ffprobe_path.as_deref(), "FFPROBE_PATH", "ffprobe"),
        }
    }

    /// Check if a tool answers `-version`
    pub async fn is_command_available(program: &Path) -> bool {
        let result = Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    /// Check if required tools are available
    pub async fn check_dependencies(&self) -> Result<()> {
        for (name, path) in [("ffmpeg", &self.ffmpeg), ("ffprobe", &self.ffprobe)] {
            if !Self::is_command_available(path).await {
                return Err(PipelineError::MissingDependency(format!(
                    "{} is required for video analysis (looked for {})",
                    name,
                    path.display()
                )));
            }
            debug!("Found {} at {}", name, path.display());
        }

        Ok(())
    }
}

fn resolve_tool(explicit: Option<&Path>, env_key: &str, default_name: &str) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(value) = env::var(env_key) {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }

    PathBuf::from(platform_command(default_name))
}

/// Get the platform-specific command name
pub fn platform_command(base_name: &str) -> String {
    if cfg!(windows) && !base_name.to_lowercase().ends_with(".exe") {
        format!("{}.exe", base_name)
    } else {
        base_name.to_string()
    }
}
