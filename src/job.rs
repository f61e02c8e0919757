//! Job and its state machine: `Queued -> Downloading -> {Completed, Failed,
//! Cancelled}`, with terminal states that are never revisited.

use crate::cancel::CancellationToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

pub struct Job {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub status: JobStatus,
    pub downloaded: u64,
    pub total: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    /// Where the file landed on disk, set once the download completes.
    /// Backs the HTTP facade's `return_file=true` streaming response.
    pub output_path: Option<PathBuf>,
}

impl Job {
    pub fn new(id: String, url: String, filename: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            url,
            filename,
            status: JobStatus::Queued,
            downloaded: 0,
            total: -1,
            error: None,
            created_at: now,
            updated_at: now,
            cancel: CancellationToken::new(),
            output_path: None,
        }
    }

    pub fn progress_percent(&self) -> u8 {
        if self.total > 0 {
            ((100 * self.downloaded as i64) / self.total).clamp(0, 100) as u8
        } else {
            0
        }
    }

    /// Attempts the transition implied by `new_status`. Terminal states are
    /// never revisited; the call is a no-op (returns `false`) if the job is
    /// already terminal.
    pub fn transition(&mut self, new_status: JobStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = new_status;
        self.error = error;
        self.updated_at = Utc::now();
        true
    }

    pub fn update_progress(&mut self, downloaded: u64, total: i64) {
        self.downloaded = downloaded;
        self.total = total;
        self.updated_at = Utc::now();
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            url: self.url.clone(),
            filename: self.filename.clone(),
            status: self.status,
            progress: self.progress_percent(),
            downloaded: self.downloaded,
            total: self.total,
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            output_path: self.output_path.clone(),
        }
    }
}

/// Defensive copy exposed to observers — the cancellation handle never
/// escapes the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub url: String,
    pub filename: String,
    pub status: JobStatus,
    pub progress: u8,
    pub downloaded: u64,
    pub total: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub output_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_is_never_revisited() {
        let mut job = Job::new("id".into(), "url".into(), "file".into());
        assert!(job.transition(JobStatus::Completed, None));
        assert!(!job.transition(JobStatus::Failed, Some("late error".into())));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn progress_percent_matches_downloaded_over_total() {
        let mut job = Job::new("id".into(), "url".into(), "file".into());
        job.update_progress(50, 200);
        assert_eq!(job.progress_percent(), 25);
    }

    #[test]
    fn progress_percent_is_zero_when_total_unknown() {
        let mut job = Job::new("id".into(), "url".into(), "file".into());
        job.update_progress(50, -1);
        assert_eq!(job.progress_percent(), 0);
    }

    #[test]
    fn view_omits_cancellation_handle() {
        let job = Job::new("id".into(), "url".into(), "file".into());
        let view = job.view();
        assert_eq!(view.id, "id");
        assert_eq!(view.status, JobStatus::Queued);
    }
}
