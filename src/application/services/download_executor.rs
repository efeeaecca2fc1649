//! Sequential batch downloader running on its own thread.
//!
//! The executor owns a snapshot of the tasks it was given and reports every
//! state change as an [`ExecutorEvent`]. It never touches the coordinator's
//! task list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::entities::{DownloadTask, ParentItem, SubItem, TaskId};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{MediaSource, MediaStream, StreamResolver};
use crate::infrastructure::worker::{CancelSignal, IsolatedThread};

/// Bytes written per chunk; also the granularity of progress events.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Minimum time between two speed samples.
pub const SPEED_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Suffix of files still being written.
pub const PART_SUFFIX: &str = "part";

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replaces characters that are illegal in file names with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if ILLEGAL_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Final location of an episode: `<root>/<drama title>/<episode title>.mp4`.
#[must_use]
pub fn destination_path(root: &Path, parent: &ParentItem, item: &SubItem) -> PathBuf {
    root.join(sanitize_filename(&parent.title))
        .join(sanitize_filename(&format!("{}.mp4", item.title)))
}

/// Location bytes are streamed into before the final rename.
#[must_use]
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// State changes reported by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    /// The task left PENDING and is resolving its stream URL.
    Started(TaskId),
    /// The stream URL is known; bytes are about to flow.
    Resolved {
        /// Task.
        id: TaskId,
        /// Resolved stream URL.
        source_url: String,
        /// Final file location.
        destination: PathBuf,
    },
    /// A chunk was written.
    Progress {
        /// Task.
        id: TaskId,
        /// Percent complete, `None` when the total is unknown.
        percent: Option<f64>,
        /// Bytes written so far.
        downloaded: u64,
        /// Announced total.
        total: Option<u64>,
        /// Last sampled rate in bytes per second.
        speed_bps: f64,
    },
    /// All bytes written and the file moved into place.
    Completed(TaskId),
    /// Resolution or transfer failed.
    Failed {
        /// Task.
        id: TaskId,
        /// Why.
        error: FetchError,
    },
    /// Stopped on request.
    Cancelled(TaskId),
    /// The batch is done, whether or not every task ran.
    Finished,
}

/// Tracks the transfer rate of one download.
#[derive(Debug)]
struct SpeedMeter {
    last_at: Instant,
    last_bytes: u64,
    speed_bps: f64,
}

impl SpeedMeter {
    fn new() -> Self {
        Self {
            last_at: Instant::now(),
            last_bytes: 0,
            speed_bps: 0.0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample(&mut self, downloaded: u64) -> f64 {
        let elapsed = self.last_at.elapsed();
        if elapsed >= SPEED_SAMPLE_INTERVAL {
            self.speed_bps = (downloaded - self.last_bytes) as f64 / elapsed.as_secs_f64();
            self.last_at = Instant::now();
            self.last_bytes = downloaded;
        }
        self.speed_bps
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent_of(downloaded: u64, total: Option<u64>) -> Option<f64> {
    total
        .filter(|t| *t > 0)
        .map(|t| (downloaded as f64 / t as f64 * 100.0).min(100.0))
}

/// Downloads a batch of tasks one after another.
pub struct DownloadExecutor {
    resolver: Arc<dyn StreamResolver>,
    media: Arc<dyn MediaSource>,
    download_dir: PathBuf,
    quality: String,
    skipped: Arc<Mutex<HashSet<TaskId>>>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
}

impl DownloadExecutor {
    /// Creates an executor reporting to `events`.
    ///
    /// Ids added to `skipped` are cancelled individually at the next poll
    /// point.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn StreamResolver>,
        media: Arc<dyn MediaSource>,
        download_dir: PathBuf,
        quality: impl Into<String>,
        skipped: Arc<Mutex<HashSet<TaskId>>>,
        events: mpsc::UnboundedSender<ExecutorEvent>,
    ) -> Self {
        Self {
            resolver,
            media,
            download_dir,
            quality: quality.into(),
            skipped,
            events,
        }
    }

    /// Runs `batch` on a dedicated thread.
    ///
    /// # Errors
    /// Returns error if the thread cannot be created.
    pub fn spawn(self, batch: Vec<DownloadTask>) -> std::io::Result<IsolatedThread> {
        IsolatedThread::spawn("download-executor", move |cancel| self.run(batch, cancel))
    }

    /// Processes `batch` in order until done or cancelled.
    ///
    /// Tasks not reached before cancellation get no event and stay PENDING.
    pub async fn run(self, batch: Vec<DownloadTask>, mut cancel: CancelSignal) {
        info!(tasks = batch.len(), "Download batch started");
        let mut completed = 0usize;

        for task in &batch {
            if cancel.is_cancelled() {
                debug!("Batch cancelled before next task");
                break;
            }
            if self.is_skipped(&task.id) {
                self.emit(ExecutorEvent::Cancelled(task.id.clone()));
                continue;
            }

            self.emit(ExecutorEvent::Started(task.id.clone()));
            match self.process(task, &mut cancel).await {
                Ok(()) => {
                    completed += 1;
                    info!(id = %task.id, "Download completed");
                    self.emit(ExecutorEvent::Completed(task.id.clone()));
                }
                Err(FetchError::Cancelled) => {
                    info!(id = %task.id, "Download cancelled");
                    self.emit(ExecutorEvent::Cancelled(task.id.clone()));
                }
                Err(error) => {
                    warn!(id = %task.id, error = %error, "Download failed");
                    self.emit(ExecutorEvent::Failed {
                        id: task.id.clone(),
                        error,
                    });
                }
            }
        }

        info!(completed, total = batch.len(), "Download batch finished");
        self.emit(ExecutorEvent::Finished);
    }

    async fn process(&self, task: &DownloadTask, cancel: &mut CancelSignal) -> FetchResult<()> {
        let source_url = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            resolved = self.resolver.resolve(&task.item.id, &self.quality) => resolved?,
        };
        let destination = destination_path(&self.download_dir, &task.parent, &task.item);
        debug!(id = %task.id, url = %source_url, path = %destination.display(), "Stream resolved");
        self.emit(ExecutorEvent::Resolved {
            id: task.id.clone(),
            source_url: source_url.clone(),
            destination: destination.clone(),
        });

        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            opened = self.media.open(&source_url) => opened?,
        };

        self.write_stream(&task.id, stream, &destination, cancel)
            .await
    }

    async fn write_stream(
        &self,
        id: &TaskId,
        stream: MediaStream,
        destination: &Path,
        cancel: &mut CancelSignal,
    ) -> FetchResult<()> {
        if let Some(dir) = destination.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let part = part_path(destination);
        let mut transfer = Transfer {
            id,
            file: tokio::fs::File::create(&part).await?,
            downloaded: 0,
            total: stream.total_bytes,
            meter: SpeedMeter::new(),
        };
        let mut chunks = stream.chunks;
        let mut pending = BytesMut::new();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                next = chunks.next() => next,
            };
            match next {
                Some(Ok(bytes)) => {
                    pending.extend_from_slice(&bytes);
                    while pending.len() >= CHUNK_SIZE {
                        let chunk = pending.split_to(CHUNK_SIZE);
                        transfer.write(&chunk, self).await?;
                        self.check_stop(id, cancel)?;
                    }
                }
                Some(Err(e)) => {
                    transfer.file.flush().await?;
                    return Err(e);
                }
                None => break,
            }
        }

        self.check_stop(id, cancel)?;
        if !pending.is_empty() {
            transfer.write(&pending, self).await?;
        }
        transfer.file.flush().await?;
        drop(transfer);

        self.check_stop(id, cancel)?;
        tokio::fs::rename(&part, destination).await?;
        Ok(())
    }

    fn check_stop(&self, id: &TaskId, cancel: &CancelSignal) -> FetchResult<()> {
        if cancel.is_cancelled() || self.is_skipped(id) {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn is_skipped(&self, id: &TaskId) -> bool {
        self.skipped.lock().contains(id)
    }

    fn emit(&self, event: ExecutorEvent) {
        // The coordinator drops its receiver once it has given up on a batch.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for DownloadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadExecutor")
            .field("download_dir", &self.download_dir)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

/// Write side of one download.
struct Transfer<'a> {
    id: &'a TaskId,
    file: tokio::fs::File,
    downloaded: u64,
    total: Option<u64>,
    meter: SpeedMeter,
}

impl Transfer<'_> {
    async fn write(&mut self, chunk: &[u8], executor: &DownloadExecutor) -> FetchResult<()> {
        self.file.write_all(chunk).await?;
        self.downloaded += chunk.len() as u64;
        executor.emit(ExecutorEvent::Progress {
            id: self.id.clone(),
            percent: percent_of(self.downloaded, self.total),
            downloaded: self.downloaded,
            total: self.total,
            speed_bps: self.meter.sample(self.downloaded),
        });
        Ok(())
    }
}
