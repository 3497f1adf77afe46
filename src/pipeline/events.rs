use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Progress sink for one document run.
///
/// The orchestrator calls these synchronously from the worker thread.
/// Implementations must return quickly.
pub trait ProcessingEvents: Send + Sync {
    /// Current step label and overall progress in [0.0, 1.0].
    fn on_status(&self, message: &str, progress: f32);

    /// One human-readable log line.
    fn on_log(&self, message: &str);

    /// A preview image of the first page was written to `path`.
    fn on_preview(&self, path: &Path);
}

/// Records every event for later inspection.
#[derive(Default)]
pub struct RecordingEvents {
    statuses: Mutex<Vec<(String, f32)>>,
    logs: Mutex<Vec<String>>,
    previews: Mutex<Vec<PathBuf>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<(String, f32)> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn previews(&self) -> Vec<PathBuf> {
        self.previews.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ProcessingEvents for RecordingEvents {
    fn on_status(&self, message: &str, progress: f32) {
        if let Ok(mut s) = self.statuses.lock() {
            s.push((message.to_string(), progress));
        }
    }

    fn on_log(&self, message: &str) {
        if let Ok(mut l) = self.logs.lock() {
            l.push(message.to_string());
        }
    }

    fn on_preview(&self, path: &Path) {
        if let Ok(mut p) = self.previews.lock() {
            p.push(path.to_path_buf());
        }
    }
}
