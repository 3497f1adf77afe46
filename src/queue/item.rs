use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::processor::ProcessingResult;

/// Lifecycle of a queued document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed { error: String },
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Snapshot of one queued document.
///
/// Never mutated in place: the queue builds a changed copy and swaps it in,
/// so a reader holding an `Arc<QueueItem>` always sees a consistent value.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub source_path: PathBuf,
    pub status: ItemStatus,
    /// 0.0–1.0.
    pub progress: f32,
    pub current_step: String,
    pub log: Vec<LogEntry>,
    pub result: Option<ProcessingResult>,
    /// Preview images written for this item, removed with the item.
    pub previews: Vec<PathBuf>,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            status: ItemStatus::Pending,
            progress: 0.0,
            current_step: String::new(),
            log: Vec::new(),
            result: None,
            previews: Vec::new(),
            added_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn push_log(&mut self, message: &str) {
        self.log.push(LogEntry {
            timestamp: Utc::now(),
            message: message.to_string(),
        });
    }

    pub(crate) fn set_progress(&mut self, step: &str, progress: f32) {
        self.current_step = step.to_string();
        self.progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
    }

    /// Back to `Pending` with progress, log and result cleared.
    pub(crate) fn reset(&mut self) {
        self.status = ItemStatus::Pending;
        self.progress = 0.0;
        self.current_step.clear();
        self.log.clear();
        self.result = None;
        self.started_at = None;
        self.finished_at = None;
    }

    /// Delete preview files. Missing files are ignored.
    pub(crate) fn remove_previews(&mut self) {
        for path in self.previews.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Preview not removed");
                }
            }
        }
    }
}
