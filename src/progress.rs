//! # Progress Feedback and Statistics Module
//!
//! Feedback visivo per l'item in elaborazione e statistiche della sessione.
//!
//! ## Componenti principali:
//! - `ProgressManager`: spinner `indicatif` con stadio e percentuale
//! - `QueueStats`: contatori della sessione (processati, falliti, sanitizzati)
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] clip.mp4 · Extracting keyframes (40%)
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for the item currently in flight
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Visible spinner; hidden when stdout carries JSON events
    pub fn new(hidden: bool) -> Self {
        if hidden {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    pub fn set_stage(&self, file: &str, stage: &str, progress: u8) {
        self.bar.set_message(format!("{} · {} ({}%)", file, stage, progress));
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Session counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub files_sanitized: usize,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_processed(&mut self, sanitized: bool) {
        self.files_processed += 1;
        if sanitized {
            self.files_sanitized += 1;
        }
    }

    pub fn add_failed(&mut self) {
        self.files_failed += 1;
    }

    pub fn total(&self) -> usize {
        self.files_processed + self.files_failed
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} | Failed: {} | Recovered by sanitizing: {}",
            self.files_processed, self.files_failed, self.files_sanitized
        )
    }
}
