//! # Item Task Module
//!
//! Pipeline di un singolo video, dal primo tentativo di analisi fino
//! all'archiviazione.
//!
//! ## Politica dei tentativi:
//! 1. Analisi dell'originale
//! 2. Se fallisce: una sola sanitizzazione e una sola nuova analisi della copia
//! 3. Se fallisce anche questa: fallimento definitivo, nessun altro tentativo
//!
//! ## Successo:
//! `analysis.json` + `prompt.txt`, generatore del template, originale in
//! `processed/`, copia sanitizzata rimossa, pulizia dei `temp_frames` precedenti.
//!
//! ## Fallimento:
//! Originale in `failed/`, riga in `failed/error.log` con la catena
//! completa degli errori. La copia sanitizzata viene comunque rimossa.

use crate::{
    analyzer::Analyze,
    collaborators::{ContentOrchestrator, TemplateGenerator},
    config::Config,
    exporter::export_analysis,
    file_manager::FileManager,
    models::VideoAnalysisResult,
    queue::{
        path_resolver::PathResolver,
        progress_tracker::{ProgressTracker, Stage},
    },
    sanitizer::Sanitize,
    state::StateStore,
    utils::component_name,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// How one item ended
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Completed {
        output_dir: PathBuf,
        archived_to: PathBuf,
        scenes: usize,
        keyframes: usize,
        sanitized: bool,
    },
    Failed {
        error: String,
        archived_to: Option<PathBuf>,
    },
}

/// Everything one item needs, borrowed from the queue manager
pub struct ItemTask<'a> {
    pub config: &'a Config,
    pub analyzer: &'a dyn Analyze,
    pub sanitizer: &'a dyn Sanitize,
    pub generator: &'a dyn TemplateGenerator,
    pub orchestrator: &'a dyn ContentOrchestrator,
}

impl ItemTask<'_> {
    /// Run the whole pipeline for `video`; never returns an error, failures are outcomes
    pub async fn process(&self, video: &Path, tracker: &ProgressTracker, state: &mut StateStore) -> ItemOutcome {
        let file_name = PathResolver::file_name(video);
        let mut sanitized_copy: Option<PathBuf> = None;

        let result = self
            .run_pipeline(video, &file_name, tracker, state, &mut sanitized_copy)
            .await;

        // The sanitized copy is scratch in both outcomes
        if let Some(copy) = sanitized_copy.as_deref() {
            if copy.exists() {
                if let Err(e) = tokio::fs::remove_file(copy).await {
                    warn!("Failed to remove sanitized copy {}: {}", copy.display(), e);
                } else {
                    debug!("Removed sanitized copy {}", copy.display());
                }
            }
        }

        match result {
            Ok(outcome) => outcome,
            Err(e) => self.fail(video, &file_name, e, tracker, state).await,
        }
    }

    async fn run_pipeline(
        &self,
        video: &Path,
        file_name: &str,
        tracker: &ProgressTracker,
        state: &mut StateStore,
        sanitized_copy: &mut Option<PathBuf>,
    ) -> Result<ItemOutcome> {
        let item_dir = PathResolver::item_output_dir(&self.config.output_dir, video)?;

        let mut analysis = self
            .analyze_with_retry(video, &item_dir, file_name, tracker, state, sanitized_copy)
            .await?;

        tracker.enter(state, file_name, Stage::Orchestrating);
        if let Some(prompt) = analysis.generated_prompt.as_deref() {
            match self.orchestrator.orchestrate(prompt).await {
                Ok(payload) => analysis.orchestration = payload,
                Err(e) => warn!("Content orchestration failed for {}, continuing without it: {:#}", file_name, e),
            }
        }

        tracker.enter(state, file_name, Stage::Exporting);
        export_analysis(&analysis, &PathResolver::analysis_path(&item_dir))
            .await
            .context("Failed to export analysis")?;
        if let Some(prompt) = analysis.generated_prompt.as_deref() {
            tokio::fs::write(PathResolver::prompt_path(&item_dir), prompt)
                .await
                .context("Failed to write prompt")?;
        }

        tracker.enter(state, file_name, Stage::Generating);
        let stem = video.file_stem().unwrap_or_default().to_string_lossy();
        self.generator
            .generate(&component_name(&stem), &analysis, &item_dir)
            .await
            .context("Template generation failed")?;

        tracker.enter(state, file_name, Stage::Finalizing);
        let archived_to = FileManager::archive_file(video, &self.config.processed_dir)
            .await
            .context("Failed to archive processed video")?;
        info!("📦 Archived source to {}", archived_to.display());

        let reclaimed = FileManager::reclaim_temp_frames(&self.config.output_dir, Some(&item_dir)).await;
        if reclaimed > 0 {
            debug!("Reclaimed {} temp_frames directories", reclaimed);
        }

        Ok(ItemOutcome::Completed {
            output_dir: item_dir,
            archived_to,
            scenes: analysis.scenes.len(),
            keyframes: analysis.keyframes.len(),
            sanitized: sanitized_copy.is_some(),
        })
    }

    async fn analyze_with_retry(
        &self,
        video: &Path,
        item_dir: &Path,
        file_name: &str,
        tracker: &ProgressTracker,
        state: &mut StateStore,
        sanitized_copy: &mut Option<PathBuf>,
    ) -> Result<VideoAnalysisResult> {
        tracker.enter(state, file_name, Stage::Analyzing);
        let first_error = match self.analyzer.analyze(video, item_dir).await {
            Ok(analysis) => return Ok(analysis),
            Err(e) => e,
        };
        warn!("Initial analysis of {} failed ({}), attempting sanitization", file_name, first_error);

        tracker.enter(state, file_name, Stage::Sanitizing);
        let copy = self
            .sanitizer
            .sanitize(video)
            .await
            .with_context(|| format!("Analysis failed ({}) and sanitizing failed", first_error))?;
        *sanitized_copy = Some(copy.clone());

        tracker.enter(state, file_name, Stage::Reanalyzing);
        self.analyzer
            .analyze(&copy, item_dir)
            .await
            .with_context(|| format!("Analysis failed ({}) and failed again after sanitizing", first_error))
    }

    async fn fail(
        &self,
        video: &Path,
        file_name: &str,
        err: anyhow::Error,
        tracker: &ProgressTracker,
        state: &mut StateStore,
    ) -> ItemOutcome {
        let message = format!("{:#}", err);
        error!("❌ {} failed: {}", file_name, message);
        tracker.enter(state, file_name, Stage::Error);

        let archived_to = if video.exists() {
            match FileManager::archive_file(video, &self.config.failed_dir).await {
                Ok(dest) => {
                    info!("Moved failed file to {}", dest.display());
                    Some(dest)
                }
                Err(e) => {
                    error!("Failed to move {} to the failed archive: {:#}", video.display(), e);
                    None
                }
            }
        } else {
            None
        };

        // The log keeps every cause, one per line
        let detail = format!("{:?}", err);
        if let Err(e) = FileManager::append_error_log(&self.config.failed_dir, file_name, &detail).await {
            error!("Failed to append to error log: {:#}", e);
        }

        ItemOutcome::Failed {
            error: message,
            archived_to,
        }
    }
}
