//! # Error Types Module
//!
//! Questo modulo definisce la tassonomia degli errori della pipeline di analisi.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` per ogni stadio che può fallire
//! - Distingue errori recuperabili (assorbiti localmente) da quelli che
//!   risalgono fino alla coda
//! - Integra con `thiserror` per la conversione automatica da errori standard
//!
//! ## Categorie di errori:
//! - `Probe`: nessuno stream video utilizzabile o ffprobe fallito
//! - `SceneDetection`: invocazione di ffmpeg fallita (zero scene NON è un errore)
//! - `KeyframeExtraction`: estrazione di un singolo frame fallita, aborta lo stadio
//! - `ColorExtraction`: sempre catturato e convertito in palette vuota
//! - `Sanitize`: transcodifica fallita, output parziale già rimosso
//! - `LockConflict`: un altro processo vivo detiene il lock, riprovare più tardi
//! - `MissingDependency`: ffmpeg/ffprobe non trovati
//!
//! ## Propagazione:
//! Gli errori `Probe`, `SceneDetection` e `KeyframeExtraction` risalgono al
//! `QueueManager`, che tenta una sola volta sanitize-and-retry prima del
//! fallimento definitivo.
//!
//! ## Esempio:
//! ```rust
//! use video_blueprint::PipelineError;
//!
//! let err = PipelineError::Probe("No video stream found".to_string());
//! assert_eq!(err.to_string(), "Failed to get video metadata: No video stream found");
//! ```

use std::path::PathBuf;

/// Errors raised by the analysis pipeline and the queue around it
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to get video metadata: {0}")]
    Probe(String),

    #[error("Failed to detect scenes: {0}")]
    SceneDetection(String),

    #[error("Failed to extract keyframe at {timestamp:.3}s: {message}")]
    KeyframeExtraction { timestamp: f64, message: String },

    #[error("Failed to extract colors from {}: {message}", .path.display())]
    ColorExtraction { path: PathBuf, message: String },

    #[error("Failed to sanitize video: {0}")]
    Sanitize(String),

    #[error("Processing lock held by pid {pid} for {file} until {expires_at}")]
    LockConflict {
        pid: u32,
        file: String,
        expires_at: String,
    },

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Video file not found: {}", .0.display())]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_conflict_message() {
        let err = PipelineError::LockConflict {
            pid: 4242,
            file: "intro.mp4".into(),
            expires_at: "2026-10-19T10:05:00Z".into(),
        };
        assert!(err.to_string().contains("pid 4242"));
        assert!(err.to_string().contains("intro.mp4"));
    }

    #[test]
    fn test_messages_carry_context() {
        let err = PipelineError::KeyframeExtraction {
            timestamp: 4.5,
            message: "ffmpeg exited with 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to extract keyframe at 4.500s: ffmpeg exited with 1"
        );
    }
}
