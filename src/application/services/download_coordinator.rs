//! Owner of the download task list.
//!
//! The coordinator queues episodes, hands the PENDING subset to a
//! [`DownloadExecutor`] running on its own thread, and folds the executor's
//! events back into the task list when [`DownloadCoordinator::pump`] is
//! called. At most one executor runs at a time.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::download_executor::{DownloadExecutor, ExecutorEvent};
use crate::domain::entities::{DownloadStatus, DownloadTask, ParentItem, SubItem, TaskId};
use crate::domain::ports::{MediaSource, StreamResolver};
use crate::infrastructure::config::DownloadsConfig;
use crate::infrastructure::worker::{IsolatedThread, StopOutcome};

/// Default wait for a cancelled executor before detaching it.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where and how downloads are written.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Root directory of downloaded files.
    pub download_dir: PathBuf,
    /// Requested stream quality.
    pub quality: String,
    /// Wait for a cancelled executor.
    pub cancel_grace: Duration,
}

impl DownloadSettings {
    /// Settings writing into `download_dir` with default quality and grace.
    #[must_use]
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            download_dir,
            quality: "1080p".to_string(),
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

impl From<&DownloadsConfig> for DownloadSettings {
    fn from(config: &DownloadsConfig) -> Self {
        Self {
            download_dir: config.effective_dir(),
            quality: config.quality.clone(),
            cancel_grace: config.cancel_grace(),
        }
    }
}

/// Notifications about the task list.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    /// A task was queued.
    TaskAdded(TaskId),
    /// A task left PENDING.
    TaskStarted(TaskId),
    /// A task wrote more bytes.
    TaskProgress {
        /// Task.
        id: TaskId,
        /// Percent complete, `None` when the total is unknown.
        percent: Option<f64>,
        /// Bytes written so far.
        downloaded: u64,
        /// Announced total.
        total: Option<u64>,
        /// Bytes per second.
        speed_bps: f64,
    },
    /// A task finished writing its file.
    TaskCompleted(TaskId),
    /// A task failed.
    TaskFailed {
        /// Task.
        id: TaskId,
        /// Failure detail.
        reason: String,
    },
    /// A task was cancelled.
    TaskCancelled(TaskId),
    /// The running batch ended.
    AllCompleted,
}

struct RunningBatch {
    thread: IsolatedThread,
    events: mpsc::UnboundedReceiver<ExecutorEvent>,
    skipped: Arc<Mutex<HashSet<TaskId>>>,
    members: HashSet<TaskId>,
}

/// Queues downloads and supervises the executor.
pub struct DownloadCoordinator {
    resolver: Arc<dyn StreamResolver>,
    media: Arc<dyn MediaSource>,
    settings: DownloadSettings,
    tasks: Vec<DownloadTask>,
    running: Option<RunningBatch>,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

impl DownloadCoordinator {
    /// Creates a coordinator and the receiver of its events.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn StreamResolver>,
        media: Arc<dyn MediaSource>,
        settings: DownloadSettings,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            resolver,
            media,
            settings,
            tasks: Vec::new(),
            running: None,
            events,
        };
        (coordinator, rx)
    }

    /// Queues the episodes of `parent` that are not already known.
    ///
    /// Returns the ids of newly added tasks.
    pub fn add_tasks(&mut self, parent: &ParentItem, items: &[SubItem]) -> Vec<TaskId> {
        let mut added = Vec::new();
        for item in items {
            let task = DownloadTask::new(parent.clone(), item.clone());
            if self.task(&task.id).is_some() {
                debug!(id = %task.id, "Skipping duplicate download");
                continue;
            }
            added.push(task.id.clone());
            self.emit(DownloadEvent::TaskAdded(task.id.clone()));
            self.tasks.push(task);
        }
        if !added.is_empty() {
            info!(parent = %parent.id, added = added.len(), "Downloads queued");
        }
        added
    }

    /// Starts an executor over the PENDING tasks.
    ///
    /// Returns false when one is already running or nothing is pending.
    pub fn start(&mut self) -> bool {
        self.pump();
        if self.running.is_some() {
            debug!("Executor already running");
            return false;
        }

        let batch: Vec<DownloadTask> = self
            .tasks
            .iter()
            .filter(|t| t.status == DownloadStatus::Pending)
            .cloned()
            .collect();
        if batch.is_empty() {
            debug!("No pending downloads");
            return false;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let skipped = Arc::new(Mutex::new(HashSet::new()));
        let members = batch.iter().map(|t| t.id.clone()).collect();
        let executor = DownloadExecutor::new(
            self.resolver.clone(),
            self.media.clone(),
            self.settings.download_dir.clone(),
            self.settings.quality.clone(),
            skipped.clone(),
            tx,
        );

        let size = batch.len();
        match executor.spawn(batch) {
            Ok(thread) => {
                info!(tasks = size, "Download executor started");
                self.running = Some(RunningBatch {
                    thread,
                    events: rx,
                    skipped,
                    members,
                });
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to spawn download executor");
                false
            }
        }
    }

    /// Stops the running executor.
    ///
    /// Waits up to the configured grace for it to exit. Tasks it left mid
    /// flight become CANCELLED; tasks it never reached stay PENDING. Events
    /// it emits afterwards are discarded.
    pub fn cancel(&mut self) {
        let Some(batch) = self.running.take() else {
            return;
        };
        let RunningBatch {
            thread,
            mut events,
            members,
            ..
        } = batch;

        let outcome = thread.stop(self.settings.cancel_grace);
        if outcome == StopOutcome::Forced {
            warn!("Download executor did not stop in time");
        }

        while let Ok(event) = events.try_recv() {
            if event != ExecutorEvent::Finished {
                self.apply(event);
            }
        }
        drop(events);

        let stranded: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| members.contains(&t.id) && t.status.is_active())
            .map(|t| t.id.clone())
            .collect();
        for id in stranded {
            self.mark_cancelled(&id);
        }
        info!(?outcome, "Download executor cancelled");
    }

    /// Cancels a single task.
    ///
    /// A task the executor is working on stops at its next poll point,
    /// at the latest before its file is moved into place. Returns true when
    /// cancellation was requested, false for unknown or finished tasks.
    pub fn cancel_task(&mut self, id: &TaskId) -> bool {
        let Some(status) = self.task(id).map(|t| t.status) else {
            return false;
        };
        if status.is_terminal() {
            return false;
        }

        if let Some(batch) = &self.running
            && batch.members.contains(id)
        {
            batch.skipped.lock().insert(id.clone());
        }
        if status == DownloadStatus::Pending {
            self.mark_cancelled(id);
        }
        debug!(%id, "Download cancellation requested");
        true
    }

    /// Tasks in insertion order.
    #[must_use]
    pub fn list_tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&DownloadTask> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Drops COMPLETED tasks and returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.status != DownloadStatus::Completed);
        before - self.tasks.len()
    }

    /// Returns true while an executor is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Applies every executor event received so far.
    ///
    /// Returns the number of events applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let Some(batch) = self.running.as_mut() else {
                break;
            };
            match batch.events.try_recv() {
                Ok(event) => {
                    applied += 1;
                    self.apply(event);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!("Download executor exited without finishing");
                    self.abandon_batch();
                    break;
                }
            }
        }
        applied
    }

    /// Pumps until no executor is running or `timeout` elapses.
    ///
    /// Returns true when idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if !self.is_running() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    fn apply(&mut self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Started(id) => {
                if let Some(task) = self.task_mut(&id) {
                    task.status = DownloadStatus::Fetching;
                    task.error = None;
                    self.emit(DownloadEvent::TaskStarted(id));
                }
            }
            ExecutorEvent::Resolved {
                id,
                source_url,
                destination,
            } => {
                if let Some(task) = self.task_mut(&id) {
                    task.status = DownloadStatus::Downloading;
                    task.source_url = Some(source_url);
                    task.destination = Some(destination);
                }
            }
            ExecutorEvent::Progress {
                id,
                percent,
                downloaded,
                total,
                speed_bps,
            } => {
                if let Some(task) = self.task_mut(&id) {
                    task.progress_percent = percent;
                    task.bytes_downloaded = downloaded;
                    task.bytes_total = total;
                    task.speed_bps = speed_bps;
                    self.emit(DownloadEvent::TaskProgress {
                        id,
                        percent,
                        downloaded,
                        total,
                        speed_bps,
                    });
                }
            }
            ExecutorEvent::Completed(id) => {
                if let Some(task) = self.task_mut(&id) {
                    task.status = DownloadStatus::Completed;
                    task.progress_percent = Some(100.0);
                    self.emit(DownloadEvent::TaskCompleted(id));
                }
            }
            ExecutorEvent::Failed { id, error } => {
                let reason = error.to_string();
                if let Some(task) = self.task_mut(&id) {
                    task.status = DownloadStatus::Failed;
                    task.error = Some(reason.clone());
                    self.emit(DownloadEvent::TaskFailed { id, reason });
                }
            }
            ExecutorEvent::Cancelled(id) => self.mark_cancelled(&id),
            ExecutorEvent::Finished => self.finish_batch(),
        }
    }

    fn finish_batch(&mut self) {
        if let Some(mut batch) = self.running.take() {
            batch.thread.join_within(self.settings.cancel_grace);
        }
        info!("Download batch completed");
        self.emit(DownloadEvent::AllCompleted);
    }

    fn abandon_batch(&mut self) {
        let Some(batch) = self.running.take() else {
            return;
        };
        for task in &mut self.tasks {
            if batch.members.contains(&task.id) && task.status.is_active() {
                task.status = DownloadStatus::Failed;
                task.error = Some("executor stopped unexpectedly".to_string());
                let _ = self.events.send(DownloadEvent::TaskFailed {
                    id: task.id.clone(),
                    reason: "executor stopped unexpectedly".to_string(),
                });
            }
        }
        self.emit(DownloadEvent::AllCompleted);
    }

    fn mark_cancelled(&mut self, id: &TaskId) {
        if let Some(task) = self.task_mut(id) {
            task.status = DownloadStatus::Cancelled;
            self.emit(DownloadEvent::TaskCancelled(id.clone()));
        }
    }

    /// Finished tasks ignore late executor events.
    fn task_mut(&mut self, id: &TaskId) -> Option<&mut DownloadTask> {
        self.tasks
            .iter_mut()
            .find(|t| &t.id == id && !t.status.is_terminal())
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("settings", &self.settings)
            .field("tasks", &self.tasks.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::download_executor::part_path;
    use crate::domain::errors::FetchError;
    use crate::domain::ports::MockStreamResolver;
    use crate::domain::errors::FetchResult;
    use crate::domain::ports::mocks::MockMediaSource;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(10);

    fn resolver() -> MockStreamResolver {
        let mut resolver = MockStreamResolver::new();
        resolver.expect_resolve().returning(|id, _quality| {
            if id == "bad" {
                Err(FetchError::api(404, "video removed"))
            } else {
                Ok(format!("https://media.example.com/{id}.mp4"))
            }
        });
        resolver
    }

    /// Resolver that takes `delay` to answer, optionally without yielding.
    struct SlowResolver {
        delay: Duration,
        blocking: bool,
    }

    #[async_trait]
    impl StreamResolver for SlowResolver {
        async fn resolve(&self, item_id: &str, _quality: &str) -> FetchResult<String> {
            if self.blocking {
                std::thread::sleep(self.delay);
            } else {
                tokio::time::sleep(self.delay).await;
            }
            Ok(format!("https://media.example.com/{item_id}.mp4"))
        }
    }

    fn coordinator_with(
        resolver: Arc<dyn StreamResolver>,
        media: MockMediaSource,
        dir: &TempDir,
        grace: Duration,
    ) -> (DownloadCoordinator, mpsc::UnboundedReceiver<DownloadEvent>) {
        let mut settings = DownloadSettings::new(dir.path().to_path_buf());
        settings.cancel_grace = grace;
        DownloadCoordinator::new(resolver, Arc::new(media), settings)
    }

    fn coordinator(
        media: MockMediaSource,
        dir: &TempDir,
    ) -> (DownloadCoordinator, mpsc::UnboundedReceiver<DownloadEvent>) {
        coordinator_with(Arc::new(resolver()), media, dir, Duration::from_secs(2))
    }

    fn pump_until(coordinator: &mut DownloadCoordinator, status: DownloadStatus) {
        let deadline = Instant::now() + WAIT;
        while coordinator.list_tasks()[0].status != status && Instant::now() < deadline {
            coordinator.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(coordinator.list_tasks()[0].status, status);
    }

    fn drama() -> ParentItem {
        ParentItem::new("500", "Drama")
    }

    fn episodes(ids: &[&str]) -> Vec<SubItem> {
        ids.iter()
            .map(|id| SubItem::new(*id, format!("Episode {id}")))
            .collect()
    }

    fn statuses(coordinator: &DownloadCoordinator) -> Vec<DownloadStatus> {
        coordinator.list_tasks().iter().map(|t| t.status).collect()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_add_tasks_deduplicates() {
        let dir = TempDir::new().unwrap();
        let (mut coordinator, mut rx) = coordinator(MockMediaSource::new(), &dir);

        let added = coordinator.add_tasks(&drama(), &episodes(&["1", "2", "1"]));
        assert_eq!(added.len(), 2);
        assert_eq!(coordinator.list_tasks().len(), 2);
        assert!(coordinator.add_tasks(&drama(), &episodes(&["2"])).is_empty());

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                DownloadEvent::TaskAdded(TaskId::composite("500", "1")),
                DownloadEvent::TaskAdded(TaskId::composite("500", "2")),
            ]
        );
    }

    #[test]
    fn test_start_without_pending_tasks_is_noop() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new().with_body("https://media.example.com/1.mp4", b"x", 1);
        let (mut coordinator, _rx) = coordinator(media, &dir);

        assert!(!coordinator.start());
        assert!(!coordinator.is_running());

        coordinator.add_tasks(&drama(), &episodes(&["1"]));
        assert!(coordinator.start());
        assert!(coordinator.wait_idle(WAIT));
        assert_eq!(statuses(&coordinator), vec![DownloadStatus::Completed]);

        assert!(!coordinator.start());
        assert!(!coordinator.is_running());
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new()
            .with_body("https://media.example.com/a.mp4", b"first", 2)
            .with_body("https://media.example.com/c.mp4", b"third", 2);
        let (mut coordinator, mut rx) = coordinator(media, &dir);
        coordinator.add_tasks(&drama(), &episodes(&["a", "bad", "c"]));

        assert!(coordinator.start());
        assert!(coordinator.wait_idle(WAIT));

        assert_eq!(
            statuses(&coordinator),
            vec![
                DownloadStatus::Completed,
                DownloadStatus::Failed,
                DownloadStatus::Completed,
            ]
        );
        let failed = &coordinator.list_tasks()[1];
        assert!(failed.error.as_deref().unwrap_or_default().contains("video removed"));

        let first = dir.path().join("Drama").join("Episode a.mp4");
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
        assert!(!part_path(&first).exists());
        assert_eq!(
            coordinator.list_tasks()[0].destination.as_deref(),
            Some(first.as_path())
        );

        let events = drain(&mut rx);
        assert_eq!(events.last(), Some(&DownloadEvent::AllCompleted));
        assert!(events.contains(&DownloadEvent::TaskFailed {
            id: TaskId::composite("500", "bad"),
            reason: FetchError::api(404, "video removed").to_string(),
        }));
    }

    #[test]
    fn test_cancel_mid_download_leaves_unstarted_tasks_pending() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new()
            .with_body("https://media.example.com/slow.mp4", &[7u8; 64 * 1024], 8 * 1024)
            .with_body("https://media.example.com/next.mp4", b"never", 5)
            .with_chunk_delay(Duration::from_millis(100));
        let (mut coordinator, _rx) = coordinator(media, &dir);
        coordinator.add_tasks(&drama(), &episodes(&["slow", "next"]));

        assert!(coordinator.start());
        let deadline = Instant::now() + WAIT;
        while coordinator.list_tasks()[0].bytes_downloaded == 0 && Instant::now() < deadline {
            coordinator.pump();
            std::thread::sleep(Duration::from_millis(5));
        }
        coordinator.cancel();

        assert!(!coordinator.is_running());
        let statuses = statuses(&coordinator);
        assert!(matches!(
            statuses[0],
            DownloadStatus::Cancelled | DownloadStatus::Failed
        ));
        assert_eq!(statuses[1], DownloadStatus::Pending);

        let dest = dir.path().join("Drama").join("Episode slow.mp4");
        assert!(!dest.exists());
        assert!(part_path(&dest).exists());
    }

    #[test]
    fn test_cancel_while_resolving() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(SlowResolver {
            delay: Duration::from_secs(30),
            blocking: false,
        });
        let (mut coordinator, _rx) =
            coordinator_with(resolver, MockMediaSource::new(), &dir, Duration::from_secs(2));
        coordinator.add_tasks(&drama(), &episodes(&["1", "2"]));

        assert!(coordinator.start());
        pump_until(&mut coordinator, DownloadStatus::Fetching);

        let started = Instant::now();
        coordinator.cancel();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(!coordinator.is_running());
        assert_eq!(
            statuses(&coordinator),
            vec![DownloadStatus::Cancelled, DownloadStatus::Pending]
        );
    }

    #[test]
    fn test_cancel_detaches_unresponsive_executor() {
        let dir = TempDir::new().unwrap();
        let resolver = Arc::new(SlowResolver {
            delay: Duration::from_millis(1500),
            blocking: true,
        });
        let (mut coordinator, mut rx) = coordinator_with(
            resolver,
            MockMediaSource::new(),
            &dir,
            Duration::from_millis(200),
        );
        coordinator.add_tasks(&drama(), &episodes(&["1", "2"]));

        assert!(coordinator.start());
        pump_until(&mut coordinator, DownloadStatus::Fetching);

        let started = Instant::now();
        coordinator.cancel();
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(!coordinator.is_running());
        assert_eq!(
            statuses(&coordinator),
            vec![DownloadStatus::Cancelled, DownloadStatus::Pending]
        );
        assert!(drain(&mut rx).contains(&DownloadEvent::TaskCancelled(TaskId::composite(
            "500", "1"
        ))));
    }

    #[test]
    fn test_cancel_task_stops_short_transfer() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new()
            .with_body("https://media.example.com/a.mp4", b"abc", 1)
            .with_body("https://media.example.com/b.mp4", b"bee", 3)
            .with_chunk_delay(Duration::from_millis(100));
        let (mut coordinator, _rx) = coordinator(media, &dir);
        let ids = coordinator.add_tasks(&drama(), &episodes(&["a", "b"]));

        assert!(coordinator.start());
        pump_until(&mut coordinator, DownloadStatus::Downloading);
        assert!(coordinator.cancel_task(&ids[0]));
        assert!(coordinator.wait_idle(WAIT));

        assert_eq!(
            statuses(&coordinator),
            vec![DownloadStatus::Cancelled, DownloadStatus::Completed]
        );
        assert!(!dir.path().join("Drama").join("Episode a.mp4").exists());
        assert_eq!(
            std::fs::read(dir.path().join("Drama").join("Episode b.mp4")).unwrap(),
            b"bee"
        );
    }

    #[test]
    fn test_cancel_task_skips_queued_item() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new()
            .with_body("https://media.example.com/1.mp4", b"one", 1)
            .with_body("https://media.example.com/2.mp4", b"two", 1)
            .with_chunk_delay(Duration::from_millis(20));
        let (mut coordinator, _rx) = coordinator(media, &dir);
        let ids = coordinator.add_tasks(&drama(), &episodes(&["1", "2"]));

        assert!(coordinator.start());
        assert!(coordinator.cancel_task(&ids[1]));
        assert!(coordinator.wait_idle(WAIT));

        assert_eq!(
            statuses(&coordinator),
            vec![DownloadStatus::Completed, DownloadStatus::Cancelled]
        );
        assert!(!coordinator.cancel_task(&ids[0]));
        assert!(!dir.path().join("Drama").join("Episode 2.mp4").exists());
    }

    #[test]
    fn test_cancelled_task_is_not_restarted() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new().with_body("https://media.example.com/2.mp4", b"2", 1);
        let (mut coordinator, _rx) = coordinator(media, &dir);
        let ids = coordinator.add_tasks(&drama(), &episodes(&["1", "2"]));

        assert!(coordinator.cancel_task(&ids[0]));
        assert!(coordinator.start());
        assert!(coordinator.wait_idle(WAIT));

        assert_eq!(
            statuses(&coordinator),
            vec![DownloadStatus::Cancelled, DownloadStatus::Completed]
        );
    }

    #[test]
    fn test_clear_completed_keeps_other_states() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new().with_body("https://media.example.com/ok.mp4", b"ok", 2);
        let (mut coordinator, _rx) = coordinator(media, &dir);
        coordinator.add_tasks(&drama(), &episodes(&["ok", "bad"]));

        coordinator.start();
        assert!(coordinator.wait_idle(WAIT));
        coordinator.add_tasks(&drama(), &episodes(&["later"]));

        assert_eq!(coordinator.clear_completed(), 1);
        assert_eq!(
            statuses(&coordinator),
            vec![DownloadStatus::Failed, DownloadStatus::Pending]
        );
    }

    #[test]
    fn test_progress_is_folded_into_tasks() {
        let dir = TempDir::new().unwrap();
        let media = MockMediaSource::new().with_unsized_body("https://media.example.com/u.mp4", b"unsized");
        let (mut coordinator, _rx) = coordinator(media, &dir);
        coordinator.add_tasks(&drama(), &episodes(&["u"]));

        coordinator.start();
        assert!(coordinator.wait_idle(WAIT));

        let task = &coordinator.list_tasks()[0];
        assert_eq!(task.status, DownloadStatus::Completed);
        assert_eq!(task.bytes_downloaded, 7);
        assert_eq!(task.bytes_total, None);
        assert_eq!(task.source_url.as_deref(), Some("https://media.example.com/u.mp4"));
    }
}
