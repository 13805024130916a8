//! # Video Blueprint Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i test di integrazione
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom della pipeline
//! - `platform`: Risoluzione di ffmpeg/ffprobe
//! - `probe`, `scene_detector`, `keyframes`, `color_analyzer`, `prompt`: stadi dell'analisi
//! - `analyzer`: Composizione degli stadi in un `VideoAnalysisResult`
//! - `sanitizer`: Ri-codifica di recupero per file corrotti
//! - `queue`: Coda seriale, lock tra processi, archiviazione
//! - `state`, `lock`: Stato osservabile e mutua esclusione su disco
//! - `watcher`: Rilevamento dei nuovi file nella directory di input
//! - `file_manager`, `exporter`: Operazioni sui file e output JSON
//! - `progress`, `json_output`: Feedback umano e machine-readable
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::sync::Arc;
//! use video_blueprint::{Config, ExternalTools, QueueManager, Sanitizer, VideoAnalyzer};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::for_input_dir("inputs", "outputs");
//! let tools = ExternalTools::from_config(&config);
//! let analyzer = Arc::new(VideoAnalyzer::new(tools.clone(), &config));
//! let sanitizer = Arc::new(Sanitizer::new(tools));
//!
//! let mut queue = QueueManager::new(config, analyzer, sanitizer).await?;
//! queue.run_once().await?;
//! # Ok(())
//! # }
//! ```

pub mod utils;

pub mod analyzer;
pub mod collaborators;
pub mod color_analyzer;
pub mod config;
pub mod error;
pub mod exporter;
pub mod file_manager;
pub mod json_output;
pub mod keyframes;
pub mod lock;
pub mod models;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod prompt;
pub mod queue;
pub mod sanitizer;
pub mod scene_detector;
pub mod state;
pub mod watcher;

pub use analyzer::{Analyze, VideoAnalyzer};
pub use collaborators::{ContentOrchestrator, TemplateGenerator};
pub use config::Config;
pub use error::PipelineError;
pub use models::{ColorPalette, Keyframe, SceneSegment, VideoAnalysisResult, VideoMetadata};
pub use platform::ExternalTools;
pub use queue::{ItemOutcome, QueueManager};
pub use sanitizer::{Sanitize, Sanitizer};
pub use state::{StateStore, SystemState};
