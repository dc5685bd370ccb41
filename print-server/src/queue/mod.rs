//! Print Job Queue
//!
//! - [`JobStore`]: durable job table (JSON file, atomic replace)
//! - [`QueueWorker`]: single dispatcher with retries

pub mod error;
mod record;
pub mod store;
pub mod types;
pub mod worker;

pub use error::{JobFailure, QueueError, QueueResult};
pub use record::QUEUE_FILE_VERSION;
pub use store::JobStore;
pub use types::{Job, JobPayload, JobStatus, JobView, MAX_COPIES, MIN_COPIES, QueueStats};
pub use worker::{QueueWorker, QueueWorkerHandle, WorkerConfig};
