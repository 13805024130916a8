//! # Directory Watcher Module
//!
//! Osserva la directory di input con polling e segnala i nuovi video solo
//! quando la scrittura è terminata.
//!
//! ## Stabilità:
//! Un file viene emesso quando dimensione e modification time restano
//! invariati per almeno `stability_threshold`. Ogni cambiamento azzera il
//! timer. Un file emesso non viene più segnalato finché esiste; se sparisce
//! (archiviato) e ricompare, viene trattato come nuovo.

use crate::file_manager::FileManager;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
struct Observation {
    len: u64,
    modified: Option<SystemTime>,
    unchanged_since: Instant,
}

/// Polling watcher with write-stability detection
#[derive(Debug)]
pub struct DirectoryWatcher {
    dir: PathBuf,
    poll_interval: Duration,
    stability_threshold: Duration,
    pending: HashMap<PathBuf, Observation>,
    emitted: HashSet<PathBuf>,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration, stability_threshold: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            stability_threshold,
            pending: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    /// Paths already handed to the queue by the startup scan
    pub fn with_known(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.emitted.extend(paths);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// One scan; returns the files that became stable, oldest observation first
    pub fn poll(&mut self, now: Instant) -> Vec<PathBuf> {
        let present = match FileManager::find_videos(&self.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to scan {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };
        let present_set: HashSet<&PathBuf> = present.iter().collect();

        self.emitted.retain(|p| present_set.contains(p));
        self.pending.retain(|p, _| present_set.contains(p));

        let mut ready = Vec::new();

        for path in present {
            if self.emitted.contains(&path) {
                continue;
            }

            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            let len = metadata.len();
            let modified = metadata.modified().ok();

            match self.pending.get_mut(&path) {
                Some(seen) if seen.len == len && seen.modified == modified => {
                    if now.saturating_duration_since(seen.unchanged_since) >= self.stability_threshold {
                        ready.push((seen.unchanged_since, path));
                    }
                }
                Some(seen) => {
                    debug!("{} still being written ({} bytes)", path.display(), len);
                    *seen = Observation {
                        len,
                        modified,
                        unchanged_since: now,
                    };
                }
                None => {
                    debug!("New file observed: {}", path.display());
                    self.pending.insert(
                        path,
                        Observation {
                            len,
                            modified,
                            unchanged_since: now,
                        },
                    );
                }
            }
        }

        ready.sort();
        ready
            .into_iter()
            .map(|(_, path)| {
                self.pending.remove(&path);
                self.emitted.insert(path.clone());
                path
            })
            .collect()
    }

    /// Poll forever, sending settled files; stops when the receiver is gone
    pub async fn run(mut self, tx: mpsc::Sender<PathBuf>) {
        info!("👀 Watching {} for new videos...", self.dir.display());
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for path in self.poll(Instant::now()) {
                info!("📥 New file detected: {}", path.display());
                if tx.send(path).await.is_err() {
                    debug!("Queue closed, watcher stopping");
                    return;
                }
            }
        }
    }
}
