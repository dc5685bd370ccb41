//! On-disk job records
//!
//! The queue file is one JSON document holding every job in creation order.
//! Records written by older builds are still accepted: missing fields take
//! defaults and renamed fields are read through aliases.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::{QueueError, QueueResult};
use super::types::{Job, JobPayload, JobStatus, iso8601};

/// Current queue file layout
pub const QUEUE_FILE_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct QueueFile {
    /// Files without a version predate the field
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

fn legacy_version() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum PayloadRecord {
    Bytes { data: String },
    File { path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JobRecord {
    #[serde(alias = "job_id")]
    pub id: String,
    #[serde(default)]
    pub payload: Option<PayloadRecord>,
    /// v1 layout kept the payload path at top level
    #[serde(default, skip_serializing)]
    pub file_path: Option<PathBuf>,
    #[serde(alias = "printer_name")]
    pub printer: String,
    #[serde(default = "default_copies")]
    pub copies: u32,
    #[serde(default)]
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

fn default_copies() -> u32 {
    1
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        let payload = match &job.payload {
            JobPayload::Bytes(bytes) => PayloadRecord::Bytes {
                data: STANDARD.encode(bytes),
            },
            JobPayload::File(path) => PayloadRecord::File { path: path.clone() },
        };
        Self {
            id: job.id.clone(),
            payload: Some(payload),
            file_path: None,
            printer: job.printer.clone(),
            copies: job.copies,
            status: job.status.as_str().to_string(),
            created_at: iso8601(job.created_at),
            updated_at: Some(iso8601(job.updated_at)),
            error: job.error.clone(),
            retry_count: job.retry_count,
        }
    }
}

impl JobRecord {
    pub fn into_job(self, max_retries: u32) -> QueueResult<Job> {
        let payload = match (self.payload, self.file_path) {
            (Some(PayloadRecord::Bytes { data }), _) => {
                let bytes = STANDARD.decode(data.as_bytes()).map_err(|e| {
                    corrupt_record(&self.id, format!("payload is not base64: {}", e))
                })?;
                JobPayload::Bytes(Arc::from(bytes))
            }
            (Some(PayloadRecord::File { path }), _) | (None, Some(path)) => JobPayload::File(path),
            (None, None) => return Err(corrupt_record(&self.id, "no payload".to_string())),
        };

        let created_at = parse_timestamp(&self.created_at).ok_or_else(|| {
            corrupt_record(&self.id, format!("bad created_at: {}", self.created_at))
        })?;
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(created_at);

        Ok(Job {
            id: self.id,
            payload,
            printer: self.printer,
            copies: self.copies,
            status: JobStatus::parse_lenient(&self.status),
            created_at,
            updated_at,
            error: self.error,
            retry_count: self.retry_count,
            max_retries,
        })
    }
}

fn corrupt_record(id: &str, reason: String) -> QueueError {
    QueueError::Corrupt {
        path: PathBuf::from(format!("job {}", id)),
        reason,
    }
}

/// RFC 3339, or a naive local timestamp as written by the v1 service
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_record_defaults() {
        let json = r#"{
            "job_id": "a1",
            "file_path": "./temp/a1.png",
            "printer": "TG2480",
            "status": "processing",
            "created_at": "2024-03-01T10:15:30.123456"
        }"#;
        let record: JobRecord = serde_json::from_str(json).unwrap();
        let job = record.into_job(3).unwrap();

        assert_eq!(job.id, "a1");
        assert_eq!(job.printer, "TG2480");
        assert_eq!(job.copies, 1);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.updated_at, job.created_at);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.payload, JobPayload::File(PathBuf::from("./temp/a1.png")));
    }

    #[test]
    fn test_printer_name_alias_and_error_message() {
        let json = r#"{
            "job_id": "a2",
            "file_path": "x.png",
            "printer_name": "Kitchen",
            "copies": 2,
            "status": "failed",
            "created_at": "2024-03-01T10:15:30+00:00",
            "updated_at": "2024-03-01T10:16:00+00:00",
            "error_message": "paper out"
        }"#;
        let job = serde_json::from_str::<JobRecord>(json)
            .unwrap()
            .into_job(3)
            .unwrap();
        assert_eq!(job.printer, "Kitchen");
        assert_eq!(job.copies, 2);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("paper out"));
        assert!(job.updated_at > job.created_at);
    }

    #[test]
    fn test_record_without_payload_rejected() {
        let json = r#"{"id": "a3", "printer": "P", "created_at": "2024-03-01T10:15:30Z"}"#;
        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(record.into_job(3), Err(QueueError::Corrupt { .. })));
    }

    #[test]
    fn test_unversioned_file_is_legacy() {
        let file: QueueFile = serde_json::from_str(r#"{"jobs": []}"#).unwrap();
        assert_eq!(file.version, 1);
    }
}
