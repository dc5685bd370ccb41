//! Durable job table
//!
//! All reads and writes go through one mutex. Every mutation is applied to a
//! copy of the table, written to disk (temp file + atomic rename) and only then
//! swapped in, all while the lock is held, so memory never runs ahead of disk.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::{QueueError, QueueResult};
use super::record::{JobRecord, QUEUE_FILE_VERSION, QueueFile};
use super::types::{Job, JobPayload, JobStatus, MAX_COPIES, MIN_COPIES, QueueStats};

/// Job store backed by a JSON file
pub struct JobStore {
    jobs: Mutex<Vec<Job>>,
    path: PathBuf,
    max_retries: u32,
    wake: Arc<Notify>,
}

impl JobStore {
    /// Open (or create) the queue file
    ///
    /// Jobs found in `Processing` are reset to `Pending`: the dispatcher that
    /// owned them did not survive.
    pub fn open(path: impl AsRef<Path>, max_retries: u32) -> QueueResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let (mut jobs, version) = Self::load(&path, max_retries)?;

        let mut recovered = 0;
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Processing) {
            job.status = JobStatus::Pending;
            job.updated_at = Utc::now();
            recovered += 1;
        }

        let store = Self {
            jobs: Mutex::new(Vec::new()),
            path,
            max_retries,
            wake: Arc::new(Notify::new()),
        };

        if recovered > 0 || (version < QUEUE_FILE_VERSION && !jobs.is_empty()) {
            store.write_file(&jobs)?;
        }
        if recovered > 0 {
            warn!(count = recovered, "Reset interrupted jobs to pending");
        }
        info!(count = jobs.len(), path = %store.path.display(), "Job queue loaded");

        *store.jobs.lock() = jobs;
        Ok(store)
    }

    fn load(path: &Path, max_retries: u32) -> QueueResult<(Vec<Job>, u32)> {
        if !path.exists() {
            return Ok((Vec::new(), QUEUE_FILE_VERSION));
        }

        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Ok((Vec::new(), QUEUE_FILE_VERSION));
        }

        let file: QueueFile = serde_json::from_str(&text).map_err(|e| QueueError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut jobs = Vec::with_capacity(file.jobs.len());
        for record in file.jobs {
            let id = record.id.clone();
            match record.into_job(max_retries) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(job_id = %id, error = %e, "Skipping unreadable job record"),
            }
        }
        jobs.sort_by_key(|j| j.created_at);
        Ok((jobs, file.version))
    }

    /// Signal fired whenever a job is admitted
    pub fn wake_signal(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    // ========== Admission & queries ==========

    /// Admit a new job; it is durable and visible as `Pending` on return
    #[instrument(skip(self, payload))]
    pub fn add(&self, payload: JobPayload, printer: &str, copies: u32) -> QueueResult<String> {
        if !(MIN_COPIES..=MAX_COPIES).contains(&copies) {
            return Err(QueueError::InvalidArgument(format!(
                "copies must be between {} and {}, got {}",
                MIN_COPIES, MAX_COPIES, copies
            )));
        }
        let printer = printer.trim();
        if printer.is_empty() {
            return Err(QueueError::InvalidArgument(
                "printer name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            payload,
            printer: printer.to_string(),
            copies,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            error: None,
            retry_count: 0,
            max_retries: self.max_retries,
        };
        let id = job.id.clone();

        self.mutate(|jobs| {
            jobs.push(job);
            Ok(((), true))
        })?;

        info!(job_id = %id, printer, copies, "Job queued");
        self.wake.notify_one();
        Ok(id)
    }

    pub fn get(&self, id: &str) -> QueueResult<Job> {
        self.jobs
            .lock()
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// All jobs in creation order
    pub fn list(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }

    /// Snapshot of `Pending` jobs in creation order
    pub fn pending(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.jobs.lock().iter() {
            stats.count(job.status);
        }
        stats
    }

    // ========== Transitions ==========

    /// Move a job along the state machine, optionally recording an error
    pub fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> QueueResult<()> {
        self.mutate(|jobs| {
            let job = find_mut(jobs, id)?;
            if job.status == status && (error.is_none() || job.status.is_terminal()) {
                return Ok(((), false));
            }
            if job.status != status && !job.status.can_transition_to(status) {
                return Err(QueueError::InvalidTransition {
                    id: id.to_string(),
                    from: job.status,
                    to: status,
                });
            }
            job.status = status;
            job.updated_at = Utc::now();
            if error.is_some() {
                job.error = error;
            }
            Ok(((), true))
        })?;
        debug!(job_id = %id, %status, "Job status updated");
        Ok(())
    }

    /// Cancel a pending or in-flight job
    ///
    /// Returns false for unknown ids and jobs already in a terminal state.
    pub fn cancel(&self, id: &str) -> QueueResult<bool> {
        let cancelled = self.mutate(|jobs| {
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return Ok((false, false));
            };
            if !job.status.can_transition_to(JobStatus::Cancelled) {
                return Ok((false, false));
            }
            job.status = JobStatus::Cancelled;
            job.updated_at = Utc::now();
            Ok((true, true))
        })?;
        if cancelled {
            info!(job_id = %id, "Job cancelled");
        }
        Ok(cancelled)
    }

    /// Claim a job for dispatch (`Pending -> Processing`)
    ///
    /// Returns false when the job is no longer pending, e.g. cancelled after
    /// the snapshot was taken.
    pub fn begin_processing(&self, id: &str) -> QueueResult<bool> {
        self.mutate(|jobs| {
            let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
                return Ok((false, false));
            };
            if job.status != JobStatus::Pending {
                return Ok((false, false));
            }
            job.status = JobStatus::Processing;
            job.updated_at = Utc::now();
            Ok((true, true))
        })
    }

    /// Mark a dispatched job `Completed`
    ///
    /// Only applies while the job is still `Processing`; returns the status
    /// the job ends up in.
    pub fn complete(&self, id: &str) -> QueueResult<JobStatus> {
        self.mutate(|jobs| {
            let job = find_mut(jobs, id)?;
            if job.status != JobStatus::Processing {
                return Ok((job.status, false));
            }
            job.status = JobStatus::Completed;
            job.updated_at = Utc::now();
            Ok((JobStatus::Completed, true))
        })
    }

    /// Record a failed dispatch attempt and apply the retry policy
    ///
    /// `retry_count` is incremented; the job goes back to `Pending` while it
    /// stays below `max_retries`, otherwise it is `Failed`.
    pub fn record_failure(&self, id: &str, error: &str) -> QueueResult<JobStatus> {
        let max_retries = self.max_retries;
        self.mutate(|jobs| {
            let job = find_mut(jobs, id)?;
            if job.status != JobStatus::Processing {
                return Ok((job.status, false));
            }
            job.retry_count += 1;
            job.error = Some(error.to_string());
            job.status = if job.retry_count < max_retries {
                JobStatus::Pending
            } else {
                JobStatus::Failed
            };
            job.updated_at = Utc::now();
            Ok((job.status, true))
        })
    }

    /// Drop terminal jobs last touched before `now - max_age`
    pub fn prune_terminal(&self, max_age: chrono::Duration) -> QueueResult<usize> {
        let cutoff = Utc::now() - max_age;
        let removed = self.mutate(|jobs| {
            let before = jobs.len();
            jobs.retain(|j| !(j.status.is_terminal() && j.updated_at < cutoff));
            let removed = before - jobs.len();
            Ok((removed, removed > 0))
        })?;
        if removed > 0 {
            info!(count = removed, "Pruned finished jobs");
        }
        Ok(removed)
    }

    // ========== Persistence ==========

    /// Apply `f` to a copy of the table and commit it if it reports a change
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut Vec<Job>) -> QueueResult<(R, bool)>,
    ) -> QueueResult<R> {
        let mut jobs = self.jobs.lock();
        let mut next = jobs.clone();
        let (out, changed) = f(&mut next)?;
        if changed {
            self.write_file(&next)?;
            *jobs = next;
        }
        Ok(out)
    }

    fn write_file(&self, jobs: &[Job]) -> QueueResult<()> {
        let file = QueueFile {
            version: QUEUE_FILE_VERSION,
            jobs: jobs.iter().map(JobRecord::from).collect(),
        };

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            serde_json::to_writer_pretty(&mut writer, &file)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(count = jobs.len(), "Queue saved");
        Ok(())
    }
}

fn find_mut<'a>(jobs: &'a mut [Job], id: &str) -> QueueResult<&'a mut Job> {
    jobs.iter_mut()
        .find(|j| j.id == id)
        .ok_or_else(|| QueueError::NotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn open_temp(max_retries: u32) -> (tempfile::TempDir, JobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::open(dir.path().join("queue.json"), max_retries).unwrap();
        (dir, store)
    }

    fn payload() -> JobPayload {
        JobPayload::from_bytes(vec![1, 2, 3])
    }

    #[test]
    fn test_add_is_immediately_pending() {
        let (_dir, store) = open_temp(3);
        let id = store.add(payload(), "TG2480", 2).unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.copies, 2);
        assert_eq!(job.created_at, job.updated_at);
        assert_eq!(store.pending().len(), 1);
    }

    #[test]
    fn test_add_rejects_bad_arguments() {
        let (dir, store) = open_temp(3);
        assert!(matches!(
            store.add(payload(), "TG2480", 0),
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.add(payload(), "TG2480", 101),
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.add(payload(), "  ", 1),
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(store.list().is_empty());
        assert!(!dir.path().join("queue.json").exists());
    }

    #[test]
    fn test_get_unknown() {
        let (_dir, store) = open_temp(3);
        assert!(matches!(store.get("nope"), Err(QueueError::NotFound(_))));
    }

    #[test]
    fn test_list_keeps_creation_order() {
        let (_dir, store) = open_temp(3);
        let ids: Vec<String> = (0..5)
            .map(|i| store.add(payload(), &format!("P{}", i), 1).unwrap())
            .collect();
        let listed: Vec<String> = store.list().into_iter().map(|j| j.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_cancel_terminal_is_refused() {
        let (_dir, store) = open_temp(3);
        let done = store.add(payload(), "P", 1).unwrap();
        assert!(store.begin_processing(&done).unwrap());
        assert_eq!(store.complete(&done).unwrap(), JobStatus::Completed);
        let before = store.get(&done).unwrap();

        assert!(!store.cancel(&done).unwrap());
        assert_eq!(store.get(&done).unwrap(), before);

        let pending = store.add(payload(), "P", 1).unwrap();
        assert!(store.cancel(&pending).unwrap());
        assert!(!store.cancel(&pending).unwrap());
        assert_eq!(store.get(&pending).unwrap().status, JobStatus::Cancelled);

        assert!(!store.cancel("unknown").unwrap());
    }

    #[test]
    fn test_cancel_in_flight_survives_write_back() {
        let (_dir, store) = open_temp(3);
        let id = store.add(payload(), "P", 1).unwrap();
        assert!(store.begin_processing(&id).unwrap());
        assert!(store.cancel(&id).unwrap());

        assert_eq!(store.complete(&id).unwrap(), JobStatus::Cancelled);
        assert_eq!(store.record_failure(&id, "late").unwrap(), JobStatus::Cancelled);
        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_begin_processing_skips_cancelled() {
        let (_dir, store) = open_temp(3);
        let id = store.add(payload(), "P", 1).unwrap();
        let snapshot = store.pending();
        store.cancel(&id).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(!store.begin_processing(&snapshot[0].id).unwrap());
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_retry_policy() {
        let (_dir, store) = open_temp(3);
        let id = store.add(payload(), "P", 1).unwrap();

        for attempt in 1..=3 {
            assert!(store.begin_processing(&id).unwrap());
            let status = store.record_failure(&id, "offline").unwrap();
            let expected = if attempt < 3 {
                JobStatus::Pending
            } else {
                JobStatus::Failed
            };
            assert_eq!(status, expected);
        }

        let job = store.get(&id).unwrap();
        assert_eq!(job.retry_count, 3);
        assert_eq!(job.error.as_deref(), Some("offline"));
        assert!(!store.begin_processing(&id).unwrap());
    }

    #[test]
    fn test_zero_retries_fails_first_time() {
        let (_dir, store) = open_temp(0);
        let id = store.add(payload(), "P", 1).unwrap();
        store.begin_processing(&id).unwrap();
        assert_eq!(store.record_failure(&id, "x").unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_update_status_enforces_state_machine() {
        let (_dir, store) = open_temp(3);
        let id = store.add(payload(), "P", 1).unwrap();

        assert!(matches!(
            store.update_status(&id, JobStatus::Completed, None),
            Err(QueueError::InvalidTransition { .. })
        ));
        store.update_status(&id, JobStatus::Processing, None).unwrap();
        store
            .update_status(&id, JobStatus::Failed, Some("jammed".to_string()))
            .unwrap();

        let job = store.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("jammed"));
        assert!(job.updated_at >= job.created_at);

        assert!(matches!(
            store.update_status(&id, JobStatus::Pending, None),
            Err(QueueError::InvalidTransition { .. })
        ));

        // Terminal jobs are frozen, even when re-set to their own status
        store
            .update_status(&id, JobStatus::Failed, Some("again".to_string()))
            .unwrap();
        assert_eq!(store.get(&id).unwrap(), job);

        assert!(matches!(
            store.update_status("nope", JobStatus::Pending, None),
            Err(QueueError::NotFound(_))
        ));
    }

    #[test]
    fn test_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let (a, b) = {
            let store = JobStore::open(&path, 3).unwrap();
            let a = store.add(JobPayload::from_bytes(vec![9; 40]), "P", 3).unwrap();
            let b = store
                .add(JobPayload::File(PathBuf::from("/srv/img.png")), "Q", 1)
                .unwrap();
            store.cancel(&b).unwrap();
            (a, b)
        };

        let store = JobStore::open(&path, 3).unwrap();
        let a = store.get(&a).unwrap();
        assert_eq!(a.payload, JobPayload::from_bytes(vec![9; 40]));
        assert_eq!(a.copies, 3);
        assert_eq!(a.status, JobStatus::Pending);
        assert_eq!(store.get(&b).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_processing_reset_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let id = {
            let store = JobStore::open(&path, 3).unwrap();
            let id = store.add(payload(), "P", 1).unwrap();
            assert!(store.begin_processing(&id).unwrap());
            id
        };

        let store = JobStore::open(&path, 3).unwrap();
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Pending);
        assert_eq!(store.pending().len(), 1);

        // The reset itself is durable
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("\"processing\""));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (dir, store) = open_temp(3);
        for _ in 0..3 {
            store.add(payload(), "P", 1).unwrap();
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JobStore::open(&path, 3),
            Err(QueueError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_legacy_file_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            r#"{"jobs": [{
                "job_id": "old-1",
                "file_path": "./temp/old.png",
                "printer": "TG2480",
                "status": "pending",
                "created_at": "2024-03-01T10:15:30.000001"
            }]}"#,
        )
        .unwrap();

        let store = JobStore::open(&path, 3).unwrap();
        assert_eq!(store.get("old-1").unwrap().copies, 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"version\": 2"));
    }

    #[test]
    fn test_prune_terminal() {
        let (_dir, store) = open_temp(3);
        let done = store.add(payload(), "P", 1).unwrap();
        store.cancel(&done).unwrap();
        let live = store.add(payload(), "P", 1).unwrap();

        assert_eq!(store.prune_terminal(chrono::Duration::hours(1)).unwrap(), 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.prune_terminal(chrono::Duration::zero()).unwrap(), 1);
        assert!(store.get(&done).is_err());
        assert!(store.get(&live).is_ok());
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = open_temp(3);
        let a = store.add(payload(), "P", 1).unwrap();
        store.add(payload(), "P", 1).unwrap();
        store.cancel(&a).unwrap();

        let stats = store.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.total(), 2);
    }
}
