//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Duration, Utc};

use docflow_domain::entities::{Job, JobStatus, TierName, WorkerRecord, WorkerState};

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            job: Job::enqueued(id, TierName::Normal, 3, "owner-1", "blob://test-doc", 4096),
        }
    }

    pub fn with_tier(mut self, tier: TierName) -> Self {
        self.job.tier = tier;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.job.owner_id = owner_id.to_string();
        self
    }

    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.job.size_bytes = size_bytes;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_worker(mut self, worker_id: &str) -> Self {
        self.job.worker_id = Some(worker_id.to_string());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.job.retry_count = retry_count;
        self
    }

    /// Backdate the enqueue time by the given number of milliseconds
    pub fn enqueued_ms_ago(mut self, ms: i64) -> Self {
        self.job.enqueued_at = Utc::now() - Duration::milliseconds(ms);
        self
    }

    /// Backdate the processing start by the given number of milliseconds
    pub fn started_ms_ago(mut self, ms: i64) -> Self {
        self.job.started_at = Some(Utc::now() - Duration::milliseconds(ms));
        self
    }

    /// Backdate the last heartbeat by the given number of milliseconds
    pub fn heartbeat_ms_ago(mut self, ms: i64) -> Self {
        self.job.last_heartbeat_at = Some(Utc::now() - Duration::milliseconds(ms));
        self
    }

    pub fn with_next_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.job.next_attempt_at = Some(at);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for creating test WorkerRecord entities
pub struct WorkerRecordBuilder {
    worker: WorkerRecord,
}

impl WorkerRecordBuilder {
    pub fn new(id: &str) -> Self {
        let mut worker = WorkerRecord::new(id, TierName::Normal, "test-host");
        worker.status = WorkerState::Idle;
        Self { worker }
    }

    pub fn with_tier(mut self, tier: TierName) -> Self {
        self.worker.tier = tier;
        self
    }

    pub fn with_status(mut self, status: WorkerState) -> Self {
        self.worker.status = status;
        self
    }

    pub fn with_current_job(mut self, job_id: &str) -> Self {
        self.worker.status = WorkerState::Processing;
        self.worker.current_job_id = Some(job_id.to_string());
        self
    }

    pub fn with_avg_processing_ms(mut self, avg_ms: f64) -> Self {
        self.worker.avg_processing_ms = avg_ms;
        self
    }

    pub fn with_jobs_completed(mut self, total: u64) -> Self {
        self.worker.jobs_completed_total = total;
        self
    }

    /// Backdate the last heartbeat by the given number of milliseconds
    pub fn heartbeat_ms_ago(mut self, ms: i64) -> Self {
        self.worker.last_heartbeat = Utc::now() - Duration::milliseconds(ms);
        self
    }

    /// Record completions at the given offsets in the past
    pub fn with_recent_completions(mut self, offsets_ms: &[i64]) -> Self {
        let now = Utc::now();
        self.worker.recent_completions = offsets_ms
            .iter()
            .map(|ms| now - Duration::milliseconds(*ms))
            .collect();
        self
    }

    /// Backdate the last error by the given number of milliseconds
    pub fn error_ms_ago(mut self, ms: i64) -> Self {
        self.worker.last_error_at = Some(Utc::now() - Duration::milliseconds(ms));
        self
    }

    /// Backdate the last completion by the given number of milliseconds
    pub fn completed_ms_ago(mut self, ms: i64) -> Self {
        self.worker.last_completed_at = Some(Utc::now() - Duration::milliseconds(ms));
        self
    }

    /// Backdate the registration time by the given number of milliseconds
    pub fn registered_ms_ago(mut self, ms: i64) -> Self {
        self.worker.registered_at = Utc::now() - Duration::milliseconds(ms);
        self
    }

    pub fn build(self) -> WorkerRecord {
        self.worker
    }
}
