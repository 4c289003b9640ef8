use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::{info, warn};

/// Metrics collector for the document processing orchestrator
pub struct MetricsCollector {
    // Job lifecycle metrics
    jobs_admitted_total: Counter,
    jobs_completed_total: Counter,
    jobs_failed_total: Counter,
    job_retries_total: Counter,
    job_processing_duration: Histogram,

    // Cluster metrics
    active_workers: Gauge,
    queue_depth: Gauge,
    scale_operations_total: Counter,

    // Recovery metrics
    recovery_sweeps_total: Counter,
    jobs_recovered_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_admitted_total: counter!("docflow_jobs_admitted_total"),
            jobs_completed_total: counter!("docflow_jobs_completed_total"),
            jobs_failed_total: counter!("docflow_jobs_failed_total"),
            job_retries_total: counter!("docflow_job_retries_total"),
            job_processing_duration: histogram!("docflow_job_processing_duration_seconds"),
            active_workers: gauge!("docflow_active_workers"),
            queue_depth: gauge!("docflow_queue_depth"),
            scale_operations_total: counter!("docflow_scale_operations_total"),
            recovery_sweeps_total: counter!("docflow_recovery_sweeps_total"),
            jobs_recovered_total: counter!("docflow_jobs_recovered_total"),
        }
    }

    /// Record a job admitted into a tier queue
    pub fn record_job_admitted(&self, tier: &str, priority: u8) {
        self.jobs_admitted_total.increment(1);

        info!(tier = tier, priority = priority, "Job admitted");
    }

    /// Record a job completion with its processing duration
    pub fn record_job_completed(&self, tier: &str, duration_seconds: f64) {
        self.jobs_completed_total.increment(1);
        self.job_processing_duration.record(duration_seconds);

        info!(
            tier = tier,
            duration_seconds = duration_seconds,
            "Job completed"
        );
    }

    /// Record a permanently failed job
    pub fn record_job_failed(&self, tier: &str, reason: &str) {
        self.jobs_failed_total.increment(1);

        warn!(tier = tier, reason = reason, "Job failed permanently");
    }

    /// Record a retry re-admission
    pub fn record_job_retry(&self, job_id: &str, retry_count: u32) {
        self.job_retries_total.increment(1);

        info!(job_id = job_id, retry_count = retry_count, "Job retry scheduled");
    }

    /// Update the number of active workers
    pub fn update_active_workers(&self, count: f64) {
        self.active_workers.set(count);
    }

    /// Update total queue depth across tiers
    pub fn update_queue_depth(&self, depth: f64) {
        self.queue_depth.set(depth);
    }

    /// Record a scaling operation
    pub fn record_scale_operation(&self, direction: &str, count: usize) {
        self.scale_operations_total.increment(1);

        info!(direction = direction, count = count, "Scaling operation executed");
    }

    /// Record a recovery sweep and how many candidates it found
    pub fn record_recovery_sweep(&self, candidates: usize) {
        self.recovery_sweeps_total.increment(1);

        if candidates > 0 {
            info!(candidates = candidates, "Recovery sweep found stale jobs");
        }
    }

    /// Record a successfully re-admitted job
    pub fn record_job_recovered(&self, job_id: &str) {
        self.jobs_recovered_total.increment(1);

        info!(job_id = job_id, "Job re-admitted after failure");
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
