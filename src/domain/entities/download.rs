//! Download task entities.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Composite identifier of a download: parent drama id plus episode id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Builds the composite id for an episode of a drama.
    ///
    /// The parent id is length-prefixed, so ids containing `_` never collide.
    #[must_use]
    pub fn composite(parent_id: &str, item_id: &str) -> Self {
        Self(format!("{}:{parent_id}_{item_id}", parent_id.len()))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Waiting for an executor.
    #[default]
    Pending,
    /// Resolving the stream URL.
    Fetching,
    /// Streaming bytes to disk.
    Downloading,
    /// All bytes written.
    Completed,
    /// Resolution or transfer failed.
    Failed,
    /// Stopped on request.
    Cancelled,
}

impl DownloadStatus {
    /// Returns true for states the executor never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true while an executor is working on the task.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Fetching | Self::Downloading)
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// The drama a batch of episodes belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentItem {
    /// Upstream drama id.
    pub id: String,
    /// Display title, used for the destination directory.
    pub title: String,
}

impl ParentItem {
    /// Creates a parent item.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One downloadable episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubItem {
    /// Upstream video id, passed to stream resolution.
    pub id: String,
    /// Display title, used for the destination file name.
    pub title: String,
}

impl SubItem {
    /// Creates a sub item.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A queued or processed download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    /// Composite id.
    pub id: TaskId,
    /// Owning drama.
    pub parent: ParentItem,
    /// Episode to fetch.
    pub item: SubItem,
    /// Current state.
    pub status: DownloadStatus,
    /// Percent complete, when the total length is known.
    pub progress_percent: Option<f64>,
    /// Resolved stream URL.
    pub source_url: Option<String>,
    /// Final file location.
    pub destination: Option<PathBuf>,
    /// Bytes written so far.
    pub bytes_downloaded: u64,
    /// Total length announced by the server.
    pub bytes_total: Option<u64>,
    /// Last measured transfer rate in bytes per second.
    pub speed_bps: f64,
    /// Failure detail for FAILED tasks.
    pub error: Option<String>,
}

impl DownloadTask {
    /// Creates a PENDING task.
    #[must_use]
    pub fn new(parent: ParentItem, item: SubItem) -> Self {
        Self {
            id: TaskId::composite(&parent.id, &item.id),
            parent,
            item,
            status: DownloadStatus::Pending,
            progress_percent: None,
            source_url: None,
            destination: None,
            bytes_downloaded: 0,
            bytes_total: None,
            speed_bps: 0.0,
            error: None,
        }
    }
}
