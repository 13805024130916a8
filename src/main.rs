//! # Video Blueprint - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Caricamento di `.env` con `dotenvy` e parsing della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione della configurazione (file JSON, poi variabili d'ambiente e flag)
//! - Dispatch dei sottocomandi
//!
//! ## Sottocomandi:
//! - `run [--once]`: coda + watcher (default)
//! - `analyze <video> [--output dir]`: analisi singola, senza coda
//! - `status [name]`: stato del sistema o di un video
//! - `health`: health check delle directory, di ffmpeg e del lock
//!
//! ## Esempio di utilizzo:
//! ```bash
//! INPUT_DIR=./drop video-blueprint run --once --verbose
//! video-blueprint analyze clip.mp4 --output ./blueprints/clip
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use video_blueprint::{
    config::sibling_dir,
    exporter::export_analysis,
    json_output::JsonMessage,
    queue::PathResolver,
    state::HealthStatus,
    Analyze, Config, ExternalTools, QueueManager, Sanitizer, StateStore, VideoAnalyzer,
};

#[derive(Parser)]
#[command(name = "video-blueprint")]
#[command(about = "Watch a folder for videos and turn each one into a replication blueprint")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON config file; flags and environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory watched for new videos
    #[arg(long, env = "INPUT_DIR", global = true)]
    input_dir: Option<PathBuf>,

    /// Root directory for analysis output
    #[arg(long, env = "OUTPUT_DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Archive for analyzed videos (default: sibling of the input dir)
    #[arg(long, env = "PROCESSED_DIR", global = true)]
    processed_dir: Option<PathBuf>,

    /// Archive for videos that could not be analyzed (default: sibling of the input dir)
    #[arg(long, env = "FAILED_DIR", global = true)]
    failed_dir: Option<PathBuf>,

    /// Directory for system-state.json and processing.lock
    #[arg(long, env = "STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Scene change sensitivity (0.0-1.0)
    #[arg(long, env = "SCENE_DETECTION_THRESHOLD", global = true)]
    scene_threshold: Option<f64>,

    /// Fallback keyframe interval in seconds
    #[arg(long, env = "KEYFRAME_INTERVAL", global = true)]
    keyframe_interval: Option<f64>,

    /// Maximum number of keyframes per video
    #[arg(long, env = "MAX_KEYFRAMES", global = true)]
    max_keyframes: Option<usize>,

    /// ffmpeg binary
    #[arg(long, env = "FFMPEG_PATH", global = true)]
    ffmpeg_path: Option<PathBuf>,

    /// ffprobe binary
    #[arg(long, env = "FFPROBE_PATH", global = true)]
    ffprobe_path: Option<PathBuf>,

    /// How long a new file's size must stay unchanged before it is queued
    #[arg(long, env = "STABILITY_THRESHOLD_MS", global = true)]
    stability_threshold_ms: Option<u64>,

    /// Wait before retrying when another process holds the lock
    #[arg(long, env = "LOCK_RETRY_DELAY_MS", global = true)]
    lock_retry_delay_ms: Option<u64>,

    /// Output progress as JSON lines for programmatic use
    #[arg(long, global = true)]
    json_output: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Process the input directory and keep watching it
    Run {
        /// Drain the current contents of the input directory and exit
        #[arg(long)]
        once: bool,
    },
    /// Analyze a single video without the queue
    Analyze {
        video: PathBuf,

        /// Where to write analysis.json and prompt.txt (default: <output-dir>/<stem>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the system state, or the status of one video
    Status { name: Option<String> },
    /// Check directories, ffmpeg and the processing lock
    Health,
}

impl Args {
    async fn build_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .await
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(input_dir) = &self.input_dir {
            config.input_dir = input_dir.clone();
            config.processed_dir = sibling_dir(input_dir, "processed");
            config.failed_dir = sibling_dir(input_dir, "failed");
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.processed_dir {
            config.processed_dir = dir.clone();
        }
        if let Some(dir) = &self.failed_dir {
            config.failed_dir = dir.clone();
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        if let Some(threshold) = self.scene_threshold {
            config.scene_threshold = threshold;
        }
        if let Some(interval) = self.keyframe_interval {
            config.keyframe_interval = interval;
        }
        if let Some(max) = self.max_keyframes {
            config.max_keyframes = max;
        }
        if self.ffmpeg_path.is_some() {
            config.ffmpeg_path = self.ffmpeg_path.clone();
        }
        if self.ffprobe_path.is_some() {
            config.ffprobe_path = self.ffprobe_path.clone();
        }
        if let Some(ms) = self.stability_threshold_ms {
            config.stability_threshold_ms = ms;
        }
        if let Some(ms) = self.lock_retry_delay_ms {
            config.lock_retry_delay_ms = ms;
        }
        config.json_output |= self.json_output;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.build_config().await?;
    let json_output = config.json_output;

    let result = match args.command.unwrap_or(Command::Run { once: false }) {
        Command::Run { once } => run_queue(config, once).await,
        Command::Analyze { video, output } => analyze_one(&config, &video, output).await,
        Command::Status { name } => show_status(&config, name.as_deref()).await,
        Command::Health => show_health(&config).await,
    };

    if let Err(e) = &result {
        if json_output {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
        }
    }
    result
}

async fn run_queue(config: Config, once: bool) -> Result<()> {
    let tools = ExternalTools::from_config(&config);
    tools.check_dependencies().await?;

    let analyzer = Arc::new(VideoAnalyzer::new(tools.clone(), &config));
    let sanitizer = Arc::new(Sanitizer::new(tools));
    let mut queue = QueueManager::new(config, analyzer, sanitizer).await?;

    let stats = if once { queue.run_once().await? } else { queue.run().await? };
    info!("Session finished: {} item(s)", stats.total());
    Ok(())
}

async fn analyze_one(config: &Config, video: &Path, output: Option<PathBuf>) -> Result<()> {
    let tools = ExternalTools::from_config(config);
    tools.check_dependencies().await?;

    let output_dir = match output {
        Some(dir) => dir,
        None => PathResolver::item_output_dir(&config.output_dir, video)?,
    };

    let analyzer = VideoAnalyzer::new(tools, config);
    let analysis = analyzer
        .analyze(video, &output_dir)
        .await
        .with_context(|| format!("Failed to analyze {}", video.display()))?;

    let analysis_path = PathResolver::analysis_path(&output_dir);
    export_analysis(&analysis, &analysis_path).await?;
    if let Some(prompt) = analysis.generated_prompt.as_deref() {
        tokio::fs::write(PathResolver::prompt_path(&output_dir), prompt).await?;
    }

    info!(
        "✅ {} scenes, {} keyframes; analysis saved to {}",
        analysis.scenes.len(),
        analysis.keyframes.len(),
        analysis_path.display()
    );
    Ok(())
}

async fn show_status(config: &Config, name: Option<&str>) -> Result<()> {
    let store = StateStore::read(&config.state_file_path()).await?;

    let rendered = match name {
        Some(name) => serde_json::to_string_pretty(&store.video_status(name))?,
        None => serde_json::to_string_pretty(store.state())?,
    };
    println!("{}", rendered);

    if name.is_none() {
        info!("Ready for new work: {}", store.is_ready());
    }
    Ok(())
}

async fn show_health(config: &Config) -> Result<()> {
    let tools = ExternalTools::from_config(config);
    let store = StateStore::read(&config.state_file_path()).await?;

    let report = store.health_check(config, &tools).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.status == HealthStatus::Error {
        return Err(anyhow::anyhow!("Health check failed"));
    }
    Ok(())
}
