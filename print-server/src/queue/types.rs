//! Print job types

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use receipt_printer::DecodeError;
use serde::Serialize;

/// Lowest accepted copy count
pub const MIN_COPIES: u32 = 1;
/// Highest accepted copy count
pub const MAX_COPIES: u32 = 100;

/// Job lifecycle state
///
/// ```text
/// Pending -> Processing -> Completed
///               |  \-----> Failed      (retries exhausted)
///               \--------> Pending     (retry)
/// Pending | Processing --> Cancelled   (explicit cancel only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a persisted status; unknown values fall back to `Pending`
    pub fn parse_lenient(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or(JobStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the state machine allows `self -> next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image payload owned by a job, fixed at admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    /// Encoded image bytes (or base64 / data URI text)
    Bytes(Arc<[u8]>),
    /// Caller-supplied file, read at dispatch time
    File(PathBuf),
}

impl JobPayload {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        JobPayload::Bytes(Arc::from(bytes.into()))
    }

    /// Fetch the raw payload bytes
    pub async fn read(&self) -> Result<Arc<[u8]>, DecodeError> {
        match self {
            JobPayload::Bytes(bytes) => Ok(bytes.clone()),
            JobPayload::File(path) => tokio::fs::read(path)
                .await
                .map(Arc::from)
                .map_err(|e| DecodeError::Unreadable(format!("{}: {}", path.display(), e))),
        }
    }
}

/// One unit of print work: one image, N copies
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub payload: JobPayload,
    pub printer: String,
    pub copies: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub retry_count: u32,
    /// Taken from the store, not persisted per job
    pub max_retries: u32,
}

impl Job {
    pub fn view(&self) -> JobView {
        JobView::from(self)
    }
}

/// Read-only projection served to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: String,
    pub status: JobStatus,
    pub printer: String,
    pub copies: u32,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            printer: job.printer.clone(),
            copies: job.copies,
            created_at: iso8601(job.created_at),
            updated_at: iso8601(job.updated_at),
            error: job.error.clone(),
            retry_count: job.retry_count,
        }
    }
}

pub(crate) fn iso8601(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Job counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub(crate) fn count(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }
}
