pub mod failure;
pub mod job;
pub mod tier;
pub mod worker;

pub use failure::FailureRecord;
pub use job::{Job, JobHandle, JobStatus, JobSubmission, StaleJobQuery};
pub use tier::{TierConfig, TierName};
pub use worker::{WorkerMetrics, WorkerRecord, WorkerState};
