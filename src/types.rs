use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Sentinel progress value: no reliable percentage is observable right now
/// (only byte/time telemetry from the remux stage, for example).
pub const INDETERMINATE: f64 = -1.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Downloading,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    /// `Downloading` is the sole non-terminal state; the rest are absorbing.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Downloading)
    }
}

/// Canonical job record, owned exclusively by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
    #[serde(rename = "filename", skip_serializing_if = "Option::is_none")]
    pub result_filename: Option<String>,
}

impl JobProgress {
    pub fn new() -> Self {
        Self {
            status: JobStatus::Downloading,
            progress: 0.0,
            message: "Preparing download...".to_string(),
            last_update: now_ms(),
            result_filename: None,
        }
    }

    /// Applies an update if it is admissible: the record must not be terminal
    /// and the update's timestamp must not precede the stored one. Returns
    /// whether the update was applied.
    pub fn apply(&mut self, up: ProgressUpdate) -> bool {
        if self.status.is_terminal() || up.last_update < self.last_update {
            return false;
        }
        self.status = up.status;
        self.progress = up.progress;
        self.message = up.message;
        self.last_update = up.last_update;
        if up.result_filename.is_some() {
            self.result_filename = up.result_filename;
        }
        true
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// A full-state update produced by the output parser or the lifecycle
/// manager. All fields are applied atomically by the registry.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    pub last_update: i64,
    pub result_filename: Option<String>,
}

impl ProgressUpdate {
    pub fn downloading(progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Downloading,
            progress,
            message: message.into(),
            last_update: now_ms(),
            result_filename: None,
        }
    }

    pub fn terminal(status: JobStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            last_update: now_ms(),
            result_filename: None,
        }
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Downloading.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_apply_rejects_stale_timestamp() {
        let mut job = JobProgress::new();
        job.last_update = 1_000;

        let mut up = ProgressUpdate::downloading(50.0, "Downloading: 50.0%");
        up.last_update = 999;
        assert!(!job.apply(up));
        assert_eq!(job.progress, 0.0);

        let mut up = ProgressUpdate::downloading(50.0, "Downloading: 50.0%");
        up.last_update = 1_000;
        assert!(job.apply(up));
        assert_eq!(job.progress, 50.0);
    }

    #[test]
    fn test_apply_noop_after_terminal() {
        let mut job = JobProgress::new();
        assert!(job.apply(ProgressUpdate::terminal(
            JobStatus::Cancelled,
            0.0,
            "Download cancelled"
        )));

        let mut late = ProgressUpdate::downloading(80.0, "Downloading: 80.0%");
        late.last_update = job.last_update + 10_000;
        assert!(!job.apply(late));
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.message, "Download cancelled");
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }
}
