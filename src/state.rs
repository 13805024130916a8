//! # State Management Module
//!
//! Questo modulo mantiene lo stato osservabile del sistema in
//! `system-state.json`, letto da strumenti esterni per sapere cosa sta
//! facendo la pipeline.
//!
//! ## Responsabilità:
//! - Stato corrente (`idle`, `analyzing`, ...) e progetto attivo con stage e percentuale
//! - Storico dei video processati e falliti, coda in attesa
//! - Ultimo video completato e ultimo errore
//! - Query di stato per nome video, readiness, health check
//!
//! ## Strategia di persistence:
//! - Salvataggio dopo ogni mutazione, scrittura atomica (file temporaneo + rename)
//! - Schema versionato: ogni campo ha un default, un file di versione diversa
//!   o illeggibile viene sostituito dai default con un warning
//! - Alla prima creazione gli storici vengono popolati dalle directory
//!   `processed/` e `failed/`
//!
//! ## Esempio struttura state file:
//! ```json
//! {
//!   "version": "1.0.0",
//!   "status": "analyzing",
//!   "activeProject": {
//!     "name": "clip.mp4",
//!     "componentName": "Clip",
//!     "startTime": "2026-01-01T10:00:00Z",
//!     "stage": "Extracting keyframes",
//!     "progress": 40
//!   },
//!   "lastProcessed": null,
//!   "lastError": null,
//!   "queue": [],
//!   "processedVideos": ["intro.mp4"],
//!   "failedVideos": [],
//!   "lockInfo": null
//! }
//! ```

use crate::config::Config;
use crate::error::Result;
use crate::file_manager::FileManager;
use crate::lock::{LockInfo, ProcessingLock};
use crate::platform::ExternalTools;
use crate::utils::component_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STATE_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    Processing,
    Analyzing,
    Sanitizing,
    Generating,
    Complete,
    Error,
    Paused,
}

impl ProcessingStatus {
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Processing
                | ProcessingStatus::Analyzing
                | ProcessingStatus::Sanitizing
                | ProcessingStatus::Generating
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveProject {
    pub name: String,
    pub component_name: String,
    pub start_time: DateTime<Utc>,
    pub stage: String,
    pub progress: u8,
}

impl ActiveProject {
    pub fn new(file_name: &str) -> Self {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());

        Self {
            name: file_name.to_string(),
            component_name: component_name(&stem),
            start_time: Utc::now(),
            stage: "Starting".to_string(),
            progress: 0,
        }
    }
}

/// Everything persisted in `system-state.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemState {
    pub version: String,
    pub status: ProcessingStatus,
    pub active_project: Option<ActiveProject>,
    pub last_processed: Option<String>,
    pub last_error: Option<String>,
    pub queue: Vec<String>,
    pub processed_videos: Vec<String>,
    pub failed_videos: Vec<String>,
    pub lock_info: Option<LockInfo>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            version: STATE_SCHEMA_VERSION.to_string(),
            status: ProcessingStatus::Idle,
            active_project: None,
            last_processed: None,
            last_error: None,
            queue: Vec::new(),
            processed_videos: Vec::new(),
            failed_videos: Vec::new(),
            lock_info: None,
        }
    }
}

/// Answer to "what happened to this video?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    pub is_processing: bool,
    pub is_processed: bool,
    pub is_failed: bool,
    pub is_in_queue: bool,
    pub details: String,
}

impl VideoStatus {
    fn unknown() -> Self {
        Self {
            is_processing: false,
            is_processed: false,
            is_failed: false,
            is_in_queue: false,
            details: "Video not found in system".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: CheckStatus,
    pub message: String,
}

impl HealthCheck {
    fn new(status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: BTreeMap<String, HealthCheck>,
}

impl HealthReport {
    fn from_checks(checks: BTreeMap<String, HealthCheck>) -> Self {
        let status = if checks.values().any(|c| c.status == CheckStatus::Error) {
            HealthStatus::Error
        } else if checks.values().any(|c| c.status == CheckStatus::Warning) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        Self { status, checks }
    }
}

/// Owns the system state and its file
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: SystemState,
}

impl StateStore {
    /// Load `path` for the queue manager, or start fresh with histories seeded
    /// from the archive dirs. The result is written back immediately.
    pub async fn load(path: &Path, processed_dir: &Path, failed_dir: &Path) -> Result<Self> {
        let state = Self::read_state(path).await?.unwrap_or_else(|| SystemState {
            processed_videos: FileManager::list_video_names(processed_dir),
            failed_videos: FileManager::list_video_names(failed_dir),
            ..SystemState::default()
        });

        let store = Self {
            path: path.to_path_buf(),
            state,
        };
        store.save()?;
        Ok(store)
    }

    /// Snapshot for observers (`status`, `health`); never touches the file
    pub async fn read(path: &Path) -> Result<Self> {
        let state = Self::read_state(path).await?.unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// `None` when the file is missing, unparsable or from another schema
    async fn read_state(path: &Path) -> Result<Option<SystemState>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<SystemState>(&content) {
            Ok(state) if state.version == STATE_SCHEMA_VERSION => Ok(Some(state)),
            Ok(state) => {
                warn!(
                    "State file {} has schema {}, expected {}; using defaults",
                    path.display(),
                    state.version,
                    STATE_SCHEMA_VERSION
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to parse state from {}, using defaults: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the state atomically (temp file in the same dir, then rename)
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let content = serde_json::to_string_pretty(&self.state)?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Mutations never fail the pipeline; a lost write is only logged
    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("Failed to save state to {}: {}", self.path.display(), e);
        }
    }

    pub fn update_status(&mut self, status: ProcessingStatus) {
        self.state.status = status;
        self.persist();
    }

    pub fn set_active_project(&mut self, project: Option<ActiveProject>) {
        if project.is_some() {
            self.state.status = ProcessingStatus::Processing;
        }
        self.state.active_project = project;
        self.persist();
    }

    pub fn update_progress(&mut self, stage: &str, progress: u8) {
        if let Some(project) = self.state.active_project.as_mut() {
            project.stage = stage.to_string();
            project.progress = progress.min(100);
            debug!("{} {}%", stage, project.progress);
            self.persist();
        }
    }

    pub fn add_to_queue(&mut self, video_name: &str) {
        if !self.state.queue.iter().any(|v| v == video_name) {
            self.state.queue.push(video_name.to_string());
            self.persist();
        }
    }

    pub fn remove_from_queue(&mut self, video_name: &str) {
        let before = self.state.queue.len();
        self.state.queue.retain(|v| v != video_name);
        if self.state.queue.len() != before {
            self.persist();
        }
    }

    pub fn mark_complete(&mut self, video_name: &str) {
        self.state.active_project = None;
        self.state.status = ProcessingStatus::Complete;
        self.state.last_processed = Some(video_name.to_string());
        self.state.last_error = None;
        self.state.processed_videos.push(video_name.to_string());
        self.state.queue.retain(|v| v != video_name);
        self.persist();
    }

    pub fn add_failed_video(&mut self, video_name: &str, error: &str) {
        self.state.failed_videos.push(video_name.to_string());
        self.state.active_project = None;
        self.state.status = ProcessingStatus::Error;
        self.state.last_error = Some(error.to_string());
        self.state.queue.retain(|v| v != video_name);
        self.persist();
    }

    pub fn set_lock_info(&mut self, lock_info: Option<LockInfo>) {
        self.state.lock_info = lock_info;
        self.persist();
    }

    /// Case-insensitive lookup; archive and queue entries match by substring
    pub fn video_status(&self, video_name: &str) -> VideoStatus {
        let name = video_name.to_lowercase();
        let contains = |list: &[String]| list.iter().any(|v| v.to_lowercase().contains(&name));

        if let Some(project) = &self.state.active_project {
            if project.name.to_lowercase() == name {
                return VideoStatus {
                    is_processing: true,
                    details: format!("Currently {} ({}%)", project.stage, project.progress),
                    ..VideoStatus::unknown()
                };
            }
        }

        if contains(&self.state.processed_videos) {
            return VideoStatus {
                is_processed: true,
                details: "Video has been processed; analysis is in the output directory".to_string(),
                ..VideoStatus::unknown()
            };
        }

        if contains(&self.state.failed_videos) {
            return VideoStatus {
                is_failed: true,
                details: "Video processing failed - check failed/error.log".to_string(),
                ..VideoStatus::unknown()
            };
        }

        if contains(&self.state.queue) {
            return VideoStatus {
                is_in_queue: true,
                details: "Video is queued for processing".to_string(),
                ..VideoStatus::unknown()
            };
        }

        VideoStatus::unknown()
    }

    /// Ready for new input unless busy; an expired lock overrides a stuck status
    pub fn is_ready(&self) -> bool {
        if let Some(lock) = &self.state.lock_info {
            if lock.is_expired(Utc::now()) {
                warn!("Stale lock detected, system is ready");
                return true;
            }
        }
        !self.state.status.is_busy()
    }

    pub async fn health_check(&self, config: &Config, tools: &ExternalTools) -> HealthReport {
        let mut checks = BTreeMap::new();

        for (label, dir) in [
            ("inputDir", &config.input_dir),
            ("outputDir", &config.output_dir),
            ("processedDir", &config.processed_dir),
            ("failedDir", &config.failed_dir),
        ] {
            let check = if dir.is_dir() {
                HealthCheck::new(CheckStatus::Ok, format!("Directory exists: {}", dir.display()))
            } else {
                HealthCheck::new(CheckStatus::Error, format!("Missing directory: {}", dir.display()))
            };
            checks.insert(label.to_string(), check);
        }

        for (label, program) in [("ffmpeg", &tools.ffmpeg), ("ffprobe", &tools.ffprobe)] {
            let check = if ExternalTools::is_command_available(program).await {
                HealthCheck::new(CheckStatus::Ok, format!("{} available", program.display()))
            } else {
                HealthCheck::new(CheckStatus::Warning, format!("{} not found", program.display()))
            };
            checks.insert(label.to_string(), check);
        }

        let lock = ProcessingLock::new(config.lock_file_path());
        let lock_check = match lock.read() {
            Ok(None) => HealthCheck::new(CheckStatus::Ok, "No active lock"),
            Ok(Some(Ok(info))) => match lock.stale_reason(&info, Utc::now()) {
                None => HealthCheck::new(CheckStatus::Ok, format!("Processing: {}", info.file)),
                Some(reason) => HealthCheck::new(CheckStatus::Warning, format!("Stale lock detected ({:?})", reason)),
            },
            Ok(Some(Err(e))) => HealthCheck::new(CheckStatus::Warning, format!("Unreadable lock file: {}", e)),
            Err(e) => HealthCheck::new(CheckStatus::Error, format!("Cannot read lock file: {}", e)),
        };
        checks.insert("lock".to_string(), lock_check);

        HealthReport::from_checks(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_store(temp_dir: &TempDir) -> StateStore {
        StateStore::load(
            &temp_dir.path().join("system-state.json"),
            &temp_dir.path().join("processed"),
            &temp_dir.path().join("failed"),
        )
        .await
        .unwrap()
    }

    fn reread(store: &StateStore) -> SystemState {
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_state_is_seeded_from_archives() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("processed")).unwrap();
        std::fs::create_dir(temp_dir.path().join("failed")).unwrap();
        std::fs::write(temp_dir.path().join("processed/intro.mp4"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("failed/broken.mov"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("failed/error.log"), b"x").unwrap();

        let store = fresh_store(&temp_dir).await;
        assert_eq!(store.state().processed_videos, vec!["intro.mp4"]);
        assert_eq!(store.state().failed_videos, vec!["broken.mov"]);
        assert_eq!(store.state().version, STATE_SCHEMA_VERSION);
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = fresh_store(&temp_dir).await;

        store.add_to_queue("clip.mp4");
        assert_eq!(reread(&store).queue, vec!["clip.mp4"]);

        store.set_active_project(Some(ActiveProject::new("clip.mp4")));
        store.update_progress("Extracting keyframes", 40);
        let saved = reread(&store);
        assert_eq!(saved.status, ProcessingStatus::Processing);
        let project = saved.active_project.unwrap();
        assert_eq!(project.component_name, "Clip");
        assert_eq!(project.progress, 40);

        store.mark_complete("clip.mp4");
        let saved = reread(&store);
        assert_eq!(saved.status, ProcessingStatus::Complete);
        assert_eq!(saved.last_processed.as_deref(), Some("clip.mp4"));
        assert!(saved.active_project.is_none());
        assert!(saved.queue.is_empty());
        assert_eq!(saved.processed_videos, vec!["clip.mp4"]);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = fresh_store(&temp_dir).await;
        store.set_active_project(Some(ActiveProject::new("bad.mp4")));
        store.add_failed_video("bad.mp4", "Failed to get video metadata: boom");

        let saved = reread(&store);
        assert_eq!(saved.status, ProcessingStatus::Error);
        assert_eq!(saved.failed_videos, vec!["bad.mp4"]);
        assert!(saved.last_error.unwrap().contains("boom"));
        assert!(saved.active_project.is_none());
    }

    #[tokio::test]
    async fn test_partial_file_gets_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("system-state.json");
        std::fs::write(&path, r#"{"version":"1.0.0","processedVideos":["a.mp4"]}"#).unwrap();

        let store = StateStore::load(&path, temp_dir.path(), temp_dir.path()).await.unwrap();
        assert_eq!(store.state().processed_videos, vec!["a.mp4"]);
        assert_eq!(store.state().status, ProcessingStatus::Idle);
        assert!(store.state().queue.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_version_or_garbage_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("system-state.json");

        std::fs::write(&path, r#"{"version":"0.1","queue":["x.mp4"]}"#).unwrap();
        let store = StateStore::load(&path, temp_dir.path(), temp_dir.path()).await.unwrap();
        assert!(store.state().queue.is_empty());

        std::fs::write(&path, "not json at all").unwrap();
        let store = StateStore::load(&path, temp_dir.path(), temp_dir.path()).await.unwrap();
        assert_eq!(store.state(), &SystemState::default());
    }

    #[tokio::test]
    async fn test_read_never_writes_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("system-state.json");

        let missing = StateStore::read(&path).await.unwrap();
        assert_eq!(missing.state(), &SystemState::default());
        assert!(!path.exists());

        let written = r#"{"version":"1.0.0","status":"analyzing","queue":["a.mp4"]}"#;
        std::fs::write(&path, written).unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();

        let store = StateStore::read(&path).await.unwrap();
        assert_eq!(store.state().status, ProcessingStatus::Analyzing);
        assert_eq!(store.state().queue, vec!["a.mp4"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);

        // Another schema is reported as defaults but left on disk as is
        let foreign = r#"{"version":"0.1","queue":["x.mp4"]}"#;
        std::fs::write(&path, foreign).unwrap();
        let store = StateStore::read(&path).await.unwrap();
        assert!(store.state().queue.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), foreign);
    }

    #[tokio::test]
    async fn test_video_status_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = fresh_store(&temp_dir).await;
        store.add_to_queue("Queued.mp4");
        store.mark_complete("Intro_Final.mp4");
        store.add_failed_video("broken.mov", "boom");
        store.set_active_project(Some(ActiveProject::new("Current.mp4")));
        store.update_progress("Detecting scenes", 25);

        let current = store.video_status("current.MP4");
        assert!(current.is_processing);
        assert_eq!(current.details, "Currently Detecting scenes (25%)");

        assert!(store.video_status("intro").is_processed);
        assert!(store.video_status("BROKEN").is_failed);
        assert!(store.video_status("queued.mp4").is_in_queue);
        assert_eq!(store.video_status("nothing.mp4"), VideoStatus::unknown());
    }

    #[tokio::test]
    async fn test_readiness() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = fresh_store(&temp_dir).await;
        assert!(store.is_ready());

        store.update_status(ProcessingStatus::Analyzing);
        assert!(!store.is_ready());

        let long_ago = Utc::now() - chrono::Duration::minutes(10);
        store.set_lock_info(Some(LockInfo::new(1, "old.mp4", long_ago, chrono::Duration::minutes(5))));
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn test_health_check_reports_missing_dirs_as_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = fresh_store(&temp_dir).await;
        let mut config = Config::for_input_dir(temp_dir.path().join("inputs"), temp_dir.path().join("outputs"));
        config.state_dir = temp_dir.path().to_path_buf();
        std::fs::create_dir_all(&config.input_dir).unwrap();

        let tools = ExternalTools {
            ffmpeg: "/definitely/not/here/ffmpeg".into(),
            ffprobe: "/definitely/not/here/ffprobe".into(),
        };
        let report = store.health_check(&config, &tools).await;

        assert_eq!(report.status, HealthStatus::Error);
        assert_eq!(report.checks["inputDir"].status, CheckStatus::Ok);
        assert_eq!(report.checks["outputDir"].status, CheckStatus::Error);
        assert_eq!(report.checks["ffmpeg"].status, CheckStatus::Warning);
        assert_eq!(report.checks["lock"].status, CheckStatus::Ok);
    }

    #[test]
    fn test_report_is_degraded_on_warnings_only() {
        let mut checks = BTreeMap::new();
        checks.insert("a".to_string(), HealthCheck::new(CheckStatus::Ok, "fine"));
        checks.insert("b".to_string(), HealthCheck::new(CheckStatus::Warning, "meh"));
        assert_eq!(HealthReport::from_checks(checks).status, HealthStatus::Degraded);
    }
}
