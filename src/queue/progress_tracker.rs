//! # Progress Tracking Module
//!
//! Unifica i tre canali di feedback per l'item in elaborazione: stato
//! persistito, spinner e (opzionale) eventi JSON.

use crate::{
    json_output::JsonMessage,
    progress::{ProgressManager, QueueStats},
    state::{ProcessingStatus, StateStore},
};

/// Pipeline stage of the item in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Locking,
    Analyzing,
    Sanitizing,
    Reanalyzing,
    Orchestrating,
    Exporting,
    Generating,
    Finalizing,
    Error,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Locking => "Acquiring lock",
            Stage::Analyzing => "Analyzing video",
            Stage::Sanitizing => "Sanitizing video",
            Stage::Reanalyzing => "Analyzing sanitized copy",
            Stage::Orchestrating => "Orchestrating content",
            Stage::Exporting => "Exporting analysis",
            Stage::Generating => "Generating template",
            Stage::Finalizing => "Finalizing",
            Stage::Error => "Error",
        }
    }

    pub fn progress(self) -> u8 {
        match self {
            Stage::Idle | Stage::Error => 0,
            Stage::Locking => 5,
            Stage::Analyzing => 10,
            Stage::Sanitizing => 30,
            Stage::Reanalyzing => 40,
            Stage::Orchestrating => 60,
            Stage::Exporting => 75,
            Stage::Generating => 85,
            Stage::Finalizing => 95,
        }
    }

    pub fn status(self) -> ProcessingStatus {
        match self {
            Stage::Idle => ProcessingStatus::Idle,
            Stage::Analyzing | Stage::Reanalyzing => ProcessingStatus::Analyzing,
            Stage::Sanitizing => ProcessingStatus::Sanitizing,
            Stage::Generating => ProcessingStatus::Generating,
            Stage::Error => ProcessingStatus::Error,
            Stage::Locking | Stage::Orchestrating | Stage::Exporting | Stage::Finalizing => {
                ProcessingStatus::Processing
            }
        }
    }
}

/// Publishes stage changes and keeps the session counters
pub struct ProgressTracker {
    json_output: bool,
    progress_manager: ProgressManager,
    stats: QueueStats,
}

impl ProgressTracker {
    pub fn new(json_output: bool) -> Self {
        Self {
            json_output,
            progress_manager: ProgressManager::new(json_output),
            stats: QueueStats::new(),
        }
    }

    pub fn json_output(&self) -> bool {
        self.json_output
    }

    /// Record `stage` for `file` everywhere it is observable
    pub fn enter(&self, state: &mut StateStore, file: &str, stage: Stage) {
        state.update_progress(stage.label(), stage.progress());
        if state.state().status != stage.status() {
            state.update_status(stage.status());
        }

        self.progress_manager.set_stage(file, stage.label(), stage.progress());
        if self.json_output {
            JsonMessage::stage(file, stage.label(), stage.progress()).emit();
        }
    }

    pub fn record_completed(&mut self, sanitized: bool) {
        self.stats.add_processed(sanitized);
    }

    pub fn record_failed(&mut self) {
        self.stats.add_failed();
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn finish(&self) {
        self.progress_manager.finish(&self.stats.format_summary());
    }
}
