//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (`--json-output`) per
//! i processi che pilotano la pipeline da fuori.
//!
//! ## Responsabilità:
//! - Emette un oggetto JSON per riga su stdout
//! - Un tipo di messaggio per ogni evento rilevante della coda
//!
//! ## Tipi di messaggi:
//! - `start`: Avvio della coda (directory e numero di file trovati)
//! - `queued`: Un file è entrato in coda
//! - `stage`: Cambio di stadio dell'item corrente, con percentuale
//! - `file_complete`: Item analizzato con successo
//! - `file_failed`: Item fallito in modo definitivo
//! - `complete`: Fine della sessione (`--once`) con statistiche
//! - `error`: Errore generale

use crate::progress::QueueStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        input_dir: PathBuf,
        output_dir: PathBuf,
        queued: usize,
    },

    #[serde(rename = "queued")]
    Queued { file: String, queue_length: usize },

    #[serde(rename = "stage")]
    Stage { file: String, stage: String, progress: u8 },

    #[serde(rename = "file_complete")]
    FileComplete {
        file: String,
        output_dir: PathBuf,
        scenes: usize,
        keyframes: usize,
        sanitized: bool,
    },

    #[serde(rename = "file_failed")]
    FileFailed { file: String, error: String },

    #[serde(rename = "complete")]
    Complete {
        files_processed: usize,
        files_failed: usize,
        files_sanitized: usize,
        duration_seconds: f64,
    },

    #[serde(rename = "error")]
    Error { message: String, details: Option<String> },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(input_dir: PathBuf, output_dir: PathBuf, queued: usize) -> Self {
        Self::Start {
            input_dir,
            output_dir,
            queued,
        }
    }

    pub fn queued(file: &str, queue_length: usize) -> Self {
        Self::Queued {
            file: file.to_string(),
            queue_length,
        }
    }

    pub fn stage(file: &str, stage: &str, progress: u8) -> Self {
        Self::Stage {
            file: file.to_string(),
            stage: stage.to_string(),
            progress,
        }
    }

    pub fn file_failed(file: &str, error: String) -> Self {
        Self::FileFailed {
            file: file.to_string(),
            error,
        }
    }

    pub fn complete(stats: &QueueStats, duration_seconds: f64) -> Self {
        Self::Complete {
            files_processed: stats.files_processed,
            files_failed: stats.files_failed,
            files_sanitized: stats.files_sanitized,
            duration_seconds,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
