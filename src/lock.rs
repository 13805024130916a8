//! # Processing Lock Module
//!
//! Lock durevole tra processi: un solo item alla volta su tutta la macchina.
//!
//! ## Formato (`processing.lock`):
//! ```json
//! { "pid": 4242, "file": "clip.mp4",
//!   "acquiredAt": "2026-01-01T10:00:00.000Z", "expiresAt": "2026-01-01T10:05:00.000Z" }
//! ```
//!
//! ## Regole:
//! - Creazione atomica (`create_new`): due processi non possono vincere entrambi
//! - Un lock scaduto (5 minuti) o di un pid non più vivo viene scartato con warning
//! - Un lock illeggibile viene trattato come stantio
//! - Altrimenti l'acquisizione fallisce con `LockConflict` e il chiamante ritenta

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

pub const LOCK_TIMEOUT_SECS: i64 = 5 * 60;

/// Contents of the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    pub file: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(pid: u32, file: impl Into<String>, now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            pid,
            file: file.into(),
            acquired_at: now,
            expires_at: now + timeout,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Why an existing lock was discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Expired,
    OwnerDead,
    OwnedBySelf,
    Unreadable,
}

/// Liveness check for lock owners
pub fn is_process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

/// The on-disk lock file
#[derive(Debug, Clone)]
pub struct ProcessingLock {
    path: PathBuf,
    timeout: Duration,
    pid: u32,
}

impl ProcessingLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Duration::seconds(LOCK_TIMEOUT_SECS),
            pid: std::process::id(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current holder, if the file exists. `Err` only for I/O other than not-found
    pub fn read(&self) -> Result<Option<std::result::Result<LockInfo, serde_json::Error>>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `lock` may be thrown away
    pub fn stale_reason(&self, lock: &LockInfo, now: DateTime<Utc>) -> Option<StaleReason> {
        if lock.is_expired(now) {
            Some(StaleReason::Expired)
        } else if lock.pid == self.pid {
            Some(StaleReason::OwnedBySelf)
        } else if !is_process_alive(lock.pid) {
            Some(StaleReason::OwnerDead)
        } else {
            None
        }
    }

    /// Remove a stale lock; returns the live holder if there is one
    pub fn validate_and_clean(&self) -> Result<Option<LockInfo>> {
        let existing = match self.read()? {
            None => return Ok(None),
            Some(existing) => existing,
        };

        let reason = match existing {
            Ok(lock) => match self.stale_reason(&lock, Utc::now()) {
                None => return Ok(Some(lock)),
                Some(reason) => {
                    warn!(
                        "⚠️  Discarding stale processing lock ({:?}): pid {} on {}",
                        reason, lock.pid, lock.file
                    );
                    reason
                }
            },
            Err(e) => {
                warn!("⚠️  Discarding unreadable processing lock {}: {}", self.path.display(), e);
                StaleReason::Unreadable
            }
        };

        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Removed stale lock ({:?})", reason);
        Ok(None)
    }

    /// Atomically create the lock for `file_name`
    pub fn acquire(&self, file_name: &str) -> Result<LockInfo> {
        if let Some(holder) = self.validate_and_clean()? {
            return Err(conflict(&holder));
        }

        match self.create(file_name) {
            Err(PipelineError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                // Someone else got in between validation and creation
                if let Some(holder) = self.validate_and_clean()? {
                    return Err(conflict(&holder));
                }
                self.create(file_name)
            }
            other => other,
        }
    }

    fn create(&self, file_name: &str) -> Result<LockInfo> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock = LockInfo::new(self.pid, file_name, Utc::now(), self.timeout);
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        file.write_all(serde_json::to_string_pretty(&lock)?.as_bytes())?;
        file.sync_all()?;

        debug!("🔒 Lock acquired for {} (pid {})", lock.file, lock.pid);
        Ok(lock)
    }

    /// Remove the lock if this process owns it
    pub fn release(&self) -> Result<()> {
        match self.read()? {
            None => Ok(()),
            Some(Ok(lock)) if lock.pid != self.pid => {
                warn!("Not releasing lock held by pid {} on {}", lock.pid, lock.file);
                Ok(())
            }
            Some(_) => {
                match std::fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                debug!("🔓 Lock released");
                Ok(())
            }
        }
    }
}

fn conflict(holder: &LockInfo) -> PipelineError {
    PipelineError::LockConflict {
        pid: holder.pid,
        file: holder.file.clone(),
        expires_at: holder.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}
