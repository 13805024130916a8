//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione del watcher e della pipeline.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con directory, soglie e path dei tool
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `input_dir`: Directory osservata (default: `inputs`)
//! - `output_dir`: Directory dei risultati (default: `outputs`)
//! - `processed_dir` / `failed_dir`: Archivi, fratelli della input dir
//! - `state_dir`: Dove vivono `system-state.json` e `processing.lock`
//! - `scene_threshold`: Sensibilità scene detection (0.0-1.0, default: 0.4)
//! - `keyframe_interval`: Passo del campionamento di fallback (default: 2s)
//! - `max_keyframes`: Numero massimo di keyframe (default: 50)
//! - `ffmpeg_path` / `ffprobe_path`: Override dei binari esterni
//!
//! Le stesse chiavi sono leggibili da ambiente (`INPUT_DIR`, `OUTPUT_DIR`,
//! `SCENE_DETECTION_THRESHOLD`, `KEYFRAME_INTERVAL`, `MAX_KEYFRAMES`,
//! `FFMPEG_PATH`, `FFPROBE_PATH`, ...) tramite la CLI in `main.rs`.
//!
//! ## Esempio:
//! ```rust
//! use video_blueprint::Config;
//!
//! let config = Config {
//!     scene_threshold: 0.3,
//!     max_keyframes: 24,
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STATE_FILE_NAME: &str = "system-state.json";
pub const LOCK_FILE_NAME: &str = "processing.lock";

/// Configuration for the watcher and the analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory watched for dropped videos
    pub input_dir: PathBuf,
    /// Root for per-video analysis output
    pub output_dir: PathBuf,
    /// Archive for successfully analyzed sources
    pub processed_dir: PathBuf,
    /// Archive for sources that failed twice, plus `error.log`
    pub failed_dir: PathBuf,
    /// Directory holding the status file and the lock file
    pub state_dir: PathBuf,
    /// Scene change sensitivity (0.0-1.0)
    pub scene_threshold: f64,
    /// Fixed sampling interval in seconds when scene detection finds too little
    pub keyframe_interval: f64,
    /// Upper bound on extracted keyframes
    pub max_keyframes: usize,
    /// Explicit ffmpeg binary (None = resolve from environment / PATH)
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit ffprobe binary (None = resolve from environment / PATH)
    pub ffprobe_path: Option<PathBuf>,
    /// A new file is picked up once its size stayed the same for this long
    pub stability_threshold_ms: u64,
    /// How often the input directory is polled
    pub poll_interval_ms: u64,
    /// Delay before retrying when another process holds the lock
    pub lock_retry_delay_ms: u64,
    /// Output progress and status as JSON lines for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        let input_dir = PathBuf::from("inputs");
        Self {
            processed_dir: sibling_dir(&input_dir, "processed"),
            failed_dir: sibling_dir(&input_dir, "failed"),
            input_dir,
            output_dir: PathBuf::from("outputs"),
            state_dir: PathBuf::from("."),
            scene_threshold: 0.4,
            keyframe_interval: 2.0,
            max_keyframes: 50,
            ffmpeg_path: None,
            ffprobe_path: None,
            stability_threshold_ms: 2000,
            poll_interval_ms: 500,
            lock_retry_delay_ms: 5000,
            json_output: false,
        }
    }
}

/// `processed` and `failed` live next to the input directory, not inside it,
/// so archived files are never picked up again by the watcher.
pub fn sibling_dir(input_dir: &Path, name: &str) -> PathBuf {
    input_dir.parent().unwrap_or(Path::new("")).join(name)
}

impl Config {
    /// Build a config rooted at `input_dir`, deriving the archive directories from it
    pub fn for_input_dir(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let input_dir = input_dir.into();
        Self {
            processed_dir: sibling_dir(&input_dir, "processed"),
            failed_dir: sibling_dir(&input_dir, "failed"),
            input_dir,
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.scene_threshold) {
            return Err(anyhow::anyhow!("Scene detection threshold must be between 0.0 and 1.0"));
        }

        if !(self.keyframe_interval.is_finite() && self.keyframe_interval > 0.0) {
            return Err(anyhow::anyhow!("Keyframe interval must be a positive number of seconds"));
        }

        if self.max_keyframes == 0 {
            return Err(anyhow::anyhow!("Maximum keyframe count must be greater than 0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Poll interval must be greater than 0"));
        }

        if self.input_dir == self.output_dir {
            return Err(anyhow::anyhow!(
                "Input and output directories must differ: {}",
                self.input_dir.display()
            ));
        }

        for archive in [&self.processed_dir, &self.failed_dir] {
            if archive == &self.input_dir {
                return Err(anyhow::anyhow!(
                    "Archive directory cannot be the input directory: {}",
                    archive.display()
                ));
            }
        }

        Ok(())
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }

    pub fn lock_file_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE_NAME)
    }

    pub fn stability_threshold(&self) -> Duration {
        Duration::from_millis(self.stability_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.scene_threshold = 1.2;
        assert!(config.validate().is_err());

        config.scene_threshold = 0.4;
        config.keyframe_interval = 0.0;
        assert!(config.validate().is_err());

        config.keyframe_interval = 2.0;
        config.max_keyframes = 0;
        assert!(config.validate().is_err());

        config.max_keyframes = 50;
        config.output_dir = config.input_dir.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.scene_threshold, 0.4);
        assert_eq!(config.keyframe_interval, 2.0);
        assert_eq!(config.max_keyframes, 50);
        assert_eq!(config.processed_dir, PathBuf::from("processed"));
        assert_eq!(config.failed_dir, PathBuf::from("failed"));
        assert_eq!(config.state_file_path(), PathBuf::from("./system-state.json"));
    }

    #[test]
    fn test_archives_are_siblings_of_input() {
        let config = Config::for_input_dir("/srv/drop/inputs", "/srv/drop/outputs");
        assert_eq!(config.processed_dir, PathBuf::from("/srv/drop/processed"));
        assert_eq!(config.failed_dir, PathBuf::from("/srv/drop/failed"));
    }

    #[tokio::test]
    async fn test_config_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            scene_threshold: 0.25,
            keyframe_interval: 1.5,
            max_keyframes: 12,
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            ..Default::default()
        };

        std::fs::write(&config_path, serde_json::to_string_pretty(&original_config).unwrap()).unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.scene_threshold, 0.25);
        assert_eq!(loaded_config.keyframe_interval, 1.5);
        assert_eq!(loaded_config.max_keyframes, 12);
        assert_eq!(loaded_config.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
    }

    #[tokio::test]
    async fn test_missing_config_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("nope.json")).await.unwrap();
        assert_eq!(config.max_keyframes, 50);
    }
}
