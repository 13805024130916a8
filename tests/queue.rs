//! Queue behaviour driven through fake analyzer and sanitizer implementations.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use video_blueprint::{
    analyzer::FRAMES_DIR_NAME,
    error::Result,
    file_manager::ERROR_LOG_NAME,
    lock::LockInfo,
    models::VideoMetadata,
    queue::{ItemOutcome, Step},
    sanitizer::{is_sanitized_copy, sanitized_path},
    state::ProcessingStatus,
    utils::unique_token,
    Analyze, Config, PipelineError, QueueManager, Sanitize, VideoAnalysisResult,
};

/// Rejects files whose contents start with `corrupt` or `hopeless`
#[derive(Default)]
struct FakeAnalyzer {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Input path and (start, end) of every call, in call order
    runs: Mutex<Vec<(PathBuf, Instant, Instant)>>,
}

impl FakeAnalyzer {
    fn analyzed_paths(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap().iter().map(|(path, ..)| path.clone()).collect()
    }
}

#[async_trait]
impl Analyze for FakeAnalyzer {
    async fn analyze(&self, video_path: &Path, output_dir: &Path) -> Result<VideoAnalysisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let contents = tokio::fs::read(video_path).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.runs
            .lock()
            .unwrap()
            .push((video_path.to_path_buf(), started, Instant::now()));

        let contents = contents?;
        if contents.starts_with(b"corrupt") || contents.starts_with(b"hopeless") {
            return Err(PipelineError::Probe("No video stream found".to_string()));
        }

        tokio::fs::create_dir_all(output_dir.join(FRAMES_DIR_NAME)).await?;
        Ok(VideoAnalysisResult {
            metadata: VideoMetadata {
                duration: 4.0,
                fps: 25.0,
                width: 1920,
                height: 1080,
                codec: "h264".to_string(),
                bitrate: None,
            },
            scenes: Vec::new(),
            keyframes: Vec::new(),
            color_palettes: Vec::new(),
            generated_prompt: Some("replicate me".to_string()),
            orchestration: None,
        })
    }
}

/// Repairs `corrupt` files; `hopeless` ones come out just as broken
#[derive(Default)]
struct FakeSanitizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Sanitize for FakeSanitizer {
    async fn sanitize(&self, input_path: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contents = tokio::fs::read(input_path).await?;
        let repaired: &[u8] = if contents.starts_with(b"corrupt") { b"repaired" } else { &contents };

        let output = sanitized_path(input_path, unique_token());
        tokio::fs::write(&output, repaired).await?;
        Ok(output)
    }
}

struct Fixture {
    temp_dir: TempDir,
    config: Config,
    analyzer: Arc<FakeAnalyzer>,
    sanitizer: Arc<FakeSanitizer>,
}

impl Fixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::for_input_dir(temp_dir.path().join("inputs"), temp_dir.path().join("outputs"));
        config.state_dir = temp_dir.path().to_path_buf();
        config.lock_retry_delay_ms = 10;
        std::fs::create_dir_all(&config.input_dir).unwrap();

        Self {
            temp_dir,
            config,
            analyzer: Arc::new(FakeAnalyzer::default()),
            sanitizer: Arc::new(FakeSanitizer::default()),
        }
    }

    fn drop_video(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.config.input_dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    async fn manager(&self) -> QueueManager {
        assert_ok!(QueueManager::new(self.config.clone(), self.analyzer.clone(), self.sanitizer.clone()).await)
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[tokio::test]
async fn test_items_are_processed_one_at_a_time() {
    let fixture = Fixture::new();
    fixture.drop_video("a.mp4", b"good");
    fixture.drop_video("b.mp4", b"good");
    fixture.drop_video("c.mov", b"good");

    let mut manager = fixture.manager().await;
    let stats = assert_ok!(manager.run_once().await);

    assert_eq!(stats.files_processed, 3);
    assert_eq!(stats.files_failed, 0);
    assert_eq!(fixture.analyzer.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.sanitizer.calls.load(Ordering::SeqCst), 0);

    assert_eq!(Fixture::names_in(&fixture.config.processed_dir), vec!["a.mp4", "b.mp4", "c.mov"]);
    assert!(Fixture::names_in(&fixture.config.input_dir).is_empty());
    for stem in ["a", "b", "c"] {
        let item_dir = fixture.config.output_dir.join(stem);
        assert!(item_dir.join("analysis.json").exists());
        assert_eq!(std::fs::read_to_string(item_dir.join("prompt.txt")).unwrap(), "replicate me");
    }

    let state = manager.state().state();
    assert_eq!(state.processed_videos.len(), 3);
    assert!(state.queue.is_empty());
    assert!(state.lock_info.is_none());
    assert!(state.active_project.is_none());
    assert_eq!(state.status, ProcessingStatus::Idle);
    assert!(state.last_processed.is_some());
    assert!(!manager.is_busy());
    assert!(!fixture.config.lock_file_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_events_arriving_together_run_back_to_back() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager().await;
    let first = fixture.drop_video("first.mp4", b"good");
    let second = fixture.drop_video("second.mp4", b"good");

    let (tx, mut rx) = mpsc::channel(8);
    let sender = tokio::spawn(async move {
        tx.send(first).await.unwrap();
        tx.send(second).await.unwrap();
    });

    assert_ok!(manager.process_events(&mut rx, std::future::pending::<()>()).await);
    assert_ok!(sender.await);

    assert_eq!(manager.stats().files_processed, 2);
    assert_eq!(fixture.analyzer.max_in_flight.load(Ordering::SeqCst), 1);

    let runs = fixture.analyzer.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].0, fixture.config.input_dir.join("first.mp4"));
    assert_eq!(runs[1].0, fixture.config.input_dir.join("second.mp4"));
    let (_, _, first_end) = runs[0];
    let (_, second_start, _) = runs[1];
    assert!(first_end <= second_start);

    assert_eq!(Fixture::names_in(&fixture.config.processed_dir), vec!["first.mp4", "second.mp4"]);
    assert!(!fixture.config.lock_file_path().exists());
}

#[tokio::test]
async fn test_lock_io_error_leaves_item_queued() {
    let fixture = Fixture::new();
    let video = fixture.drop_video("waiting.mp4", b"good");
    let mut manager = fixture.manager().await;

    // A directory where the lock file should be cannot be read as a lock
    std::fs::create_dir_all(fixture.config.lock_file_path()).unwrap();
    manager.enqueue(video.clone());

    let step = assert_ok!(manager.process_next().await);
    assert_eq!(step, Step::Blocked);
    assert_eq!(manager.queue_len(), 1);
    assert!(!manager.is_busy());
    assert!(video.exists());
    assert_eq!(fixture.analyzer.calls.load(Ordering::SeqCst), 0);

    std::fs::remove_dir(fixture.config.lock_file_path()).unwrap();
    let step = assert_ok!(manager.process_next().await);
    assert!(matches!(step, Step::Done(_, ItemOutcome::Completed { .. })));
}

#[tokio::test]
async fn test_corrupt_video_is_recovered_by_sanitizing() {
    let fixture = Fixture::new();
    let video = fixture.drop_video("broken.mp4", b"corrupt header");

    let mut manager = fixture.manager().await;
    manager.enqueue(video);
    let step = assert_ok!(manager.process_next().await);

    match step {
        Step::Done(_, ItemOutcome::Completed { sanitized, archived_to, .. }) => {
            assert!(sanitized);
            assert_eq!(archived_to, fixture.config.processed_dir.join("broken.mp4"));
            // The original is archived, not the repaired copy
            assert_eq!(std::fs::read(&archived_to).unwrap(), b"corrupt header");
        }
        other => panic!("unexpected step: {:?}", other),
    }

    assert_eq!(fixture.analyzer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.sanitizer.calls.load(Ordering::SeqCst), 1);
    let analyzed = fixture.analyzer.analyzed_paths();
    assert_eq!(analyzed[0], fixture.config.input_dir.join("broken.mp4"));
    assert!(is_sanitized_copy(&analyzed[1]));
    assert_eq!(analyzed[1].parent(), Some(fixture.config.input_dir.as_path()));
    assert!(Fixture::names_in(&fixture.config.input_dir).is_empty());
    assert_eq!(manager.stats().files_sanitized, 1);
}

#[tokio::test]
async fn test_hopeless_video_goes_to_failed_after_one_retry() {
    let fixture = Fixture::new();
    fixture.drop_video("hopeless.mp4", b"hopeless bytes");

    let mut manager = fixture.manager().await;
    let stats = assert_ok!(manager.run_once().await);

    assert_eq!(stats.files_failed, 1);
    assert_eq!(fixture.analyzer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fixture.sanitizer.calls.load(Ordering::SeqCst), 1);

    assert_eq!(Fixture::names_in(&fixture.config.failed_dir), vec![ERROR_LOG_NAME, "hopeless.mp4"]);
    assert!(Fixture::names_in(&fixture.config.processed_dir).is_empty());
    assert!(Fixture::names_in(&fixture.config.input_dir)
        .iter()
        .all(|name| !is_sanitized_copy(Path::new(name))));

    let log = std::fs::read_to_string(fixture.config.failed_dir.join(ERROR_LOG_NAME)).unwrap();
    assert!(log.contains("hopeless.mp4: "));
    assert!(log.contains("No video stream found"));
    assert!(log.contains("Caused by:"));

    let state = manager.state().state();
    assert_eq!(state.failed_videos, vec!["hopeless.mp4"]);
    assert!(state.last_error.is_some());
    assert!(manager.state().video_status("hopeless.mp4").is_failed);
}

#[tokio::test]
async fn test_stale_lock_is_discarded_on_startup() {
    let fixture = Fixture::new();
    fixture.drop_video("clip.mp4", b"good");

    // Unexpired, but its owner does not exist
    let crashed = LockInfo::new(u32::MAX - 7, "crashed.mp4", Utc::now(), ChronoDuration::minutes(5));
    std::fs::write(fixture.config.lock_file_path(), serde_json::to_string(&crashed).unwrap()).unwrap();

    let mut manager = fixture.manager().await;
    assert!(!fixture.config.lock_file_path().exists());

    let stats = assert_ok!(manager.run_once().await);
    assert_eq!(stats.files_processed, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_live_foreign_lock_blocks_the_queue() {
    let fixture = Fixture::new();
    let video = fixture.drop_video("clip.mp4", b"good");

    let foreign = LockInfo::new(std::os::unix::process::parent_id(), "other.mp4", Utc::now(), ChronoDuration::minutes(5));
    std::fs::write(fixture.config.lock_file_path(), serde_json::to_string(&foreign).unwrap()).unwrap();

    let mut manager = fixture.manager().await;
    manager.enqueue(video.clone());

    assert_eq!(assert_ok!(manager.process_next().await), Step::Blocked);
    assert_eq!(manager.queue_len(), 1);
    assert_eq!(fixture.analyzer.calls.load(Ordering::SeqCst), 0);
    assert!(video.exists());

    // Owner gone: the next attempt goes through
    std::fs::remove_file(fixture.config.lock_file_path()).unwrap();
    let step = assert_ok!(manager.process_next().await);
    assert!(matches!(step, Step::Done(_, ItemOutcome::Completed { .. })));
}

#[tokio::test]
async fn test_archive_collision_gets_unique_suffix() {
    let fixture = Fixture::new();
    std::fs::create_dir_all(&fixture.config.processed_dir).unwrap();
    std::fs::write(fixture.config.processed_dir.join("clip.mp4"), b"first run").unwrap();
    fixture.drop_video("clip.mp4", b"good");

    let mut manager = fixture.manager().await;
    assert_ok!(manager.run_once().await);

    let names = Fixture::names_in(&fixture.config.processed_dir);
    assert_eq!(names.len(), 2);
    assert_eq!(
        std::fs::read(fixture.config.processed_dir.join("clip.mp4")).unwrap(),
        b"first run"
    );
    let renamed = names.iter().find(|n| n.as_str() != "clip.mp4").unwrap();
    assert!(renamed.starts_with("clip_") && renamed.ends_with(".mp4"));
}

#[tokio::test]
async fn test_previous_temp_frames_are_reclaimed() {
    let fixture = Fixture::new();
    let old_frames = fixture.config.output_dir.join("older").join(FRAMES_DIR_NAME);
    std::fs::create_dir_all(&old_frames).unwrap();
    std::fs::write(old_frames.join("frame_0000.png"), b"png").unwrap();
    fixture.drop_video("clip.mp4", b"good");

    let mut manager = fixture.manager().await;
    assert_ok!(manager.run_once().await);

    assert!(!old_frames.exists());
    assert!(fixture.config.output_dir.join("older").exists());
    assert!(fixture.config.output_dir.join("clip").join(FRAMES_DIR_NAME).exists());
}

#[tokio::test]
async fn test_vanished_and_duplicate_entries() {
    let fixture = Fixture::new();
    let mut manager = fixture.manager().await;

    let ghost = fixture.config.input_dir.join("ghost.mp4");
    assert!(manager.enqueue(ghost.clone()));
    assert!(!manager.enqueue(ghost.clone()));
    assert_eq!(manager.queue_len(), 1);

    assert_eq!(assert_ok!(manager.process_next().await), Step::Skipped(ghost));
    assert_eq!(assert_ok!(manager.process_next().await), Step::Idle);
    assert!(manager.state().state().queue.is_empty());
    assert!(fixture.temp_dir.path().join("system-state.json").exists());
}
