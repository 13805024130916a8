//! # Queue Manager
//!
//! Orchestratore principale: coda FIFO, esecuzione strettamente seriale,
//! lock tra processi e aggiornamento dello stato.
//!
//! ## Ciclo di vita:
//! 1. Bootstrap: directory di lavoro, stato, validazione del lock esistente
//! 2. Scan iniziale della directory di input
//! 3. Drain: un item alla volta, solo con flag in-memory libero e lock acquisito
//! 4. Lock di un altro processo vivo, o errore di I/O sul lock: attesa di
//!    `lock_retry_delay` e nuovo tentativo
//! 5. In modalità watch: nuovi file dal watcher, fino a Ctrl-C

use crate::{
    analyzer::Analyze,
    collaborators::{ContentOrchestrator, NoOrchestrator, NoopTemplateGenerator, TemplateGenerator},
    config::Config,
    error::PipelineError,
    file_manager::FileManager,
    json_output::JsonMessage,
    lock::ProcessingLock,
    progress::QueueStats,
    queue::{
        path_resolver::PathResolver,
        progress_tracker::{ProgressTracker, Stage},
        task::{ItemOutcome, ItemTask},
    },
    sanitizer::Sanitize,
    state::{ActiveProject, ProcessingStatus, StateStore},
    watcher::DirectoryWatcher,
};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of one attempt to take work off the queue
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing queued, or an item is already in flight
    Idle,
    /// The lock could not be taken (held by another live process, or an
    /// I/O error); the item stays at the head
    Blocked,
    /// The item was missing on disk and was dropped
    Skipped(PathBuf),
    Done(PathBuf, ItemOutcome),
}

pub struct QueueManager {
    config: Config,
    state: StateStore,
    lock: ProcessingLock,
    analyzer: Arc<dyn Analyze>,
    sanitizer: Arc<dyn Sanitize>,
    generator: Arc<dyn TemplateGenerator>,
    orchestrator: Arc<dyn ContentOrchestrator>,
    queue: VecDeque<PathBuf>,
    busy: bool,
    tracker: ProgressTracker,
}

impl QueueManager {
    /// Validate config, create missing dirs, load state and clear a stale lock
    pub async fn new(config: Config, analyzer: Arc<dyn Analyze>, sanitizer: Arc<dyn Sanitize>) -> Result<Self> {
        config.validate()?;

        FileManager::ensure_dirs(&[
            &config.input_dir,
            &config.output_dir,
            &config.processed_dir,
            &config.failed_dir,
            &config.state_dir,
        ])
        .await?;

        let mut state = StateStore::load(&config.state_file_path(), &config.processed_dir, &config.failed_dir)
            .await
            .context("Failed to load system state")?;

        let lock = ProcessingLock::new(config.lock_file_path());
        match lock.validate_and_clean()? {
            Some(holder) => info!(
                "🔒 Processing lock held by pid {} on {} until {}",
                holder.pid, holder.file, holder.expires_at
            ),
            None => {
                // Whatever a previous run left in the state is no longer true
                if state.state().lock_info.is_some() || state.state().active_project.is_some() {
                    warn!("Clearing leftover in-flight state from a previous run");
                    state.set_lock_info(None);
                    state.set_active_project(None);
                    state.update_status(ProcessingStatus::Idle);
                }
            }
        }
        // Queue contents are rebuilt from the input dir on every start
        for name in state.state().queue.clone() {
            state.remove_from_queue(&name);
        }

        let tracker = ProgressTracker::new(config.json_output);

        Ok(Self {
            config,
            state,
            lock,
            analyzer,
            sanitizer,
            generator: Arc::new(NoopTemplateGenerator),
            orchestrator: Arc::new(NoOrchestrator),
            queue: VecDeque::new(),
            busy: false,
            tracker,
        })
    }

    pub fn with_template_generator(mut self, generator: Arc<dyn TemplateGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn ContentOrchestrator>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn stats(&self) -> &QueueStats {
        self.tracker.stats()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Append to the FIFO; a path already waiting is not queued twice
    pub fn enqueue(&mut self, path: PathBuf) -> bool {
        if self.queue.contains(&path) {
            debug!("{} already queued", path.display());
            return false;
        }

        let file_name = PathResolver::file_name(&path);
        self.queue.push_back(path);
        self.state.add_to_queue(&file_name);

        if self.tracker.json_output() {
            JsonMessage::queued(&file_name, self.queue.len()).emit();
        }
        true
    }

    fn enqueue_all(&mut self, found: &[PathBuf]) {
        for path in found {
            self.enqueue(path.clone());
        }
        info!("Found {} video(s) in {}", found.len(), self.config.input_dir.display());
    }

    fn startup_scan(&mut self) -> Result<Vec<PathBuf>> {
        let found = FileManager::find_videos(&self.config.input_dir)?;
        self.emit_start(found.len());
        self.enqueue_all(&found);
        Ok(found)
    }

    /// Take the head of the queue through the pipeline, if allowed
    pub async fn process_next(&mut self) -> Result<Step> {
        if self.busy {
            return Ok(Step::Idle);
        }
        let Some(video) = self.queue.pop_front() else {
            return Ok(Step::Idle);
        };

        let file_name = PathResolver::file_name(&video);
        if !video.exists() {
            warn!("{} disappeared before processing, skipping", video.display());
            self.state.remove_from_queue(&file_name);
            return Ok(Step::Skipped(video));
        }

        let lock_info = match self.lock.acquire(&file_name) {
            Ok(info) => info,
            Err(PipelineError::LockConflict { pid, file, expires_at }) => {
                info!(
                    "⏳ Another process (pid {}) is processing {} until {}; retrying in {:?}",
                    pid,
                    file,
                    expires_at,
                    self.config.lock_retry_delay()
                );
                self.queue.push_front(video);
                return Ok(Step::Blocked);
            }
            Err(e) => {
                warn!(
                    "Failed to acquire processing lock for {}: {}; retrying in {:?}",
                    file_name,
                    e,
                    self.config.lock_retry_delay()
                );
                self.queue.push_front(video);
                return Ok(Step::Blocked);
            }
        };

        self.busy = true;
        self.state.set_lock_info(Some(lock_info));
        self.state.set_active_project(Some(ActiveProject::new(&file_name)));
        self.tracker.enter(&mut self.state, &file_name, Stage::Locking);
        info!("🎬 Processing {}", file_name);

        let task = ItemTask {
            config: &self.config,
            analyzer: self.analyzer.as_ref(),
            sanitizer: self.sanitizer.as_ref(),
            generator: self.generator.as_ref(),
            orchestrator: self.orchestrator.as_ref(),
        };
        let outcome = task.process(&video, &self.tracker, &mut self.state).await;

        match &outcome {
            ItemOutcome::Completed {
                output_dir,
                scenes,
                keyframes,
                sanitized,
                ..
            } => {
                self.state.mark_complete(&file_name);
                self.tracker.record_completed(*sanitized);
                info!("✅ {} done, output saved to {}", file_name, output_dir.display());
                if self.tracker.json_output() {
                    JsonMessage::FileComplete {
                        file: file_name.clone(),
                        output_dir: output_dir.clone(),
                        scenes: *scenes,
                        keyframes: *keyframes,
                        sanitized: *sanitized,
                    }
                    .emit();
                }
            }
            ItemOutcome::Failed { error, .. } => {
                self.state.add_failed_video(&file_name, error);
                self.tracker.record_failed();
                if self.tracker.json_output() {
                    JsonMessage::file_failed(&file_name, error.clone()).emit();
                }
            }
        }

        if let Err(e) = self.lock.release() {
            warn!("Failed to release processing lock: {}", e);
        }
        self.state.set_lock_info(None);
        if matches!(outcome, ItemOutcome::Completed { .. }) {
            self.state.update_status(ProcessingStatus::Idle);
        }
        self.busy = false;

        Ok(Step::Done(video, outcome))
    }

    /// Process until the queue is empty, waiting out foreign locks
    pub async fn drain(&mut self) -> Result<()> {
        loop {
            match self.process_next().await? {
                Step::Idle => return Ok(()),
                Step::Blocked => tokio::time::sleep(self.config.lock_retry_delay()).await,
                Step::Skipped(_) | Step::Done(..) => {}
            }
        }
    }

    /// Scan, drain and return (`--once`)
    pub async fn run_once(&mut self) -> Result<QueueStats> {
        let start_time = Instant::now();
        self.startup_scan()?;
        self.drain().await?;
        self.finish(start_time);
        Ok(self.stats().clone())
    }

    /// Scan, then keep draining as the watcher reports new files, until Ctrl-C
    pub async fn run(&mut self) -> Result<QueueStats> {
        let start_time = Instant::now();
        let found = self.startup_scan()?;

        let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
        let watcher = DirectoryWatcher::new(
            &self.config.input_dir,
            self.config.poll_interval(),
            self.config.stability_threshold(),
        )
        .with_known(found);
        let watcher_handle = tokio::spawn(watcher.run(tx));

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        let result = self.process_events(&mut rx, shutdown).await;

        watcher_handle.abort();
        result?;
        self.finish(start_time);
        Ok(self.stats().clone())
    }

    /// Queue paths as they arrive on `rx`, draining between batches, until
    /// the channel closes or `shutdown` resolves.
    ///
    /// `shutdown` is only observed while waiting, never in the middle of an item.
    pub async fn process_events<F>(&mut self, rx: &mut mpsc::Receiver<PathBuf>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.drain().await?;

            tokio::select! {
                received = rx.recv() => match received {
                    Some(path) => {
                        self.enqueue(path);
                        while let Ok(path) = rx.try_recv() {
                            self.enqueue(path);
                        }
                    }
                    None => {
                        debug!("Event channel closed");
                        return Ok(());
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn emit_start(&self, found: usize) {
        if self.tracker.json_output() {
            JsonMessage::start(self.config.input_dir.clone(), self.config.output_dir.clone(), found).emit();
        } else {
            info!(
                "Starting video analysis queue: {} -> {}",
                self.config.input_dir.display(),
                self.config.output_dir.display()
            );
        }
    }

    fn finish(&self, start_time: Instant) {
        self.tracker.finish();
        let stats = self.stats();
        if self.tracker.json_output() {
            JsonMessage::complete(stats, start_time.elapsed().as_secs_f64()).emit();
        } else {
            info!("{}", stats.format_summary());
        }
    }
}
