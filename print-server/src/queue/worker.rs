//! Queue Worker
//!
//! Single dispatcher draining the job store: snapshot the pending jobs,
//! claim each one, render it once and send the bytes `copies` times.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use receipt_printer::{PrinterTransport, RasterSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{JobFailure, QueueResult};
use super::store::JobStore;
use super::types::{Job, JobStatus};

/// Worker timing and rendering knobs
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub raster: RasterSettings,
    /// Idle wait between cycles
    pub poll_interval: Duration,
    /// Wait after a cycle failed unexpectedly
    pub error_backoff: Duration,
    /// Per-send deadline; `None` waits on the transport
    pub send_timeout: Option<Duration>,
    /// Terminal jobs older than this are pruned each cycle
    pub retention: Option<chrono::Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            raster: RasterSettings::default(),
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
            send_timeout: None,
            retention: None,
        }
    }
}

/// Result of one dispatch attempt, waiting to be written back
#[derive(Debug, Clone)]
enum Outcome {
    Printed,
    Failed(String),
}

/// Single-threaded print dispatcher
pub struct QueueWorker {
    store: Arc<JobStore>,
    transport: Arc<dyn PrinterTransport>,
    config: WorkerConfig,
    /// Claimed job whose outcome could not be persisted yet
    unsettled: Option<(String, Outcome)>,
}

impl QueueWorker {
    pub fn new(
        store: Arc<JobStore>,
        transport: Arc<dyn PrinterTransport>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
            unsettled: None,
        }
    }

    /// Start the worker on the runtime
    pub fn spawn(self) -> QueueWorkerHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move { self.run(token).await });
        QueueWorkerHandle { shutdown, handle }
    }

    /// Run until `shutdown` fires
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("Queue worker started");
        let wake = self.store.wake_signal();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle(&shutdown).await {
                Ok(()) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = wake.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Queue cycle failed, backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        if let Some((id, _)) = &self.unsettled {
            tracing::warn!(
                job_id = %id,
                "Job outcome not persisted; it will be retried on next start"
            );
        }
        tracing::info!("Queue worker stopped");
    }

    /// One pass over the pending snapshot
    ///
    /// A job whose outcome failed to persist stays claimed; its outcome is
    /// written back first thing in the next cycle.
    async fn run_cycle(&mut self, shutdown: &CancellationToken) -> QueueResult<()> {
        if let Some((id, outcome)) = self.unsettled.take() {
            if let Err(e) = self.settle(&id, &outcome) {
                self.unsettled = Some((id, outcome));
                return Err(e);
            }
            tracing::info!(job_id = %id, "Deferred job outcome recorded");
        }

        if let Some(max_age) = self.config.retention {
            self.store.prune_terminal(max_age)?;
        }

        for job in self.store.pending() {
            if shutdown.is_cancelled() {
                break;
            }
            // Cancelled (or otherwise moved) since the snapshot
            if !self.store.begin_processing(&job.id)? {
                continue;
            }

            tracing::info!(
                job_id = %job.id,
                printer = %job.printer,
                copies = job.copies,
                "Processing job"
            );

            let result = AssertUnwindSafe(self.print_job(&job))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(JobFailure::Render(panic_message(panic))));

            let outcome = match result {
                Ok(()) => Outcome::Printed,
                Err(failure) => Outcome::Failed(failure.to_string()),
            };
            if let Err(e) = self.settle(&job.id, &outcome) {
                self.unsettled = Some((job.id, outcome));
                return Err(e);
            }
        }

        Ok(())
    }

    /// Write a dispatch outcome back to the store
    fn settle(&self, id: &str, outcome: &Outcome) -> QueueResult<()> {
        match outcome {
            Outcome::Printed => match self.store.complete(id)? {
                JobStatus::Completed => tracing::info!(job_id = %id, "Job completed"),
                other => tracing::info!(
                    job_id = %id,
                    status = %other,
                    "Job finished after leaving processing"
                ),
            },
            Outcome::Failed(message) => match self.store.record_failure(id, message)? {
                JobStatus::Pending => tracing::warn!(
                    job_id = %id,
                    error = %message,
                    "Print failed, will retry"
                ),
                JobStatus::Failed => tracing::error!(
                    job_id = %id,
                    error = %message,
                    "Print failed, retries exhausted"
                ),
                other => tracing::info!(
                    job_id = %id,
                    status = %other,
                    error = %message,
                    "Print failed after job left processing"
                ),
            },
        }
        Ok(())
    }

    /// Render once, send `copies` times
    async fn print_job(&self, job: &Job) -> Result<(), JobFailure> {
        let payload = job.payload.read().await?;

        let settings = self.config.raster;
        let data = tokio::task::spawn_blocking(move || receipt_printer::render(&payload, &settings))
            .await
            .map_err(|e| JobFailure::Render(e.to_string()))??;

        tracing::debug!(job_id = %job.id, bytes = data.len(), "Job rendered");

        for copy in 1..=job.copies {
            self.send(&job.printer, &data).await?;
            tracing::debug!(job_id = %job.id, copy, "Copy sent");
        }
        Ok(())
    }

    async fn send(&self, printer: &str, data: &[u8]) -> Result<(), JobFailure> {
        let send = self.transport.send_raw(printer, data);
        match self.config.send_timeout {
            Some(limit) => match tokio::time::timeout(limit, send).await {
                Ok(result) => result.map_err(JobFailure::from),
                Err(_) => Err(JobFailure::Transport(receipt_printer::PrintError::Timeout(
                    format!("send to {} exceeded {:?}", printer, limit),
                ))),
            },
            None => send.await.map_err(JobFailure::from),
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Handle to a spawned [`QueueWorker`]
pub struct QueueWorkerHandle {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl QueueWorkerHandle {
    /// Request a stop and wait up to `timeout` for the worker to exit
    ///
    /// The job in flight (if any) is allowed to finish all of its copies.
    /// Returns false if the worker was still running at the deadline.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.shutdown.cancel();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Queue worker task failed");
                true
            }
            Err(_) => {
                tracing::warn!(?timeout, "Queue worker did not stop in time");
                false
            }
        }
    }
}
