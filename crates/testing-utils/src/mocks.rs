//! Mock implementations for all repository and service traits
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without requiring actual queue brokers or external
//! services. Mocks with a failure switch return errors on demand so
//! degraded paths can be exercised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use docflow_core::{OrchestratorError, OrchestratorResult};
use docflow_domain::entities::{
    FailureRecord, Job, JobStatus, StaleJobQuery, TierName, WorkerRecord,
};
use docflow_domain::events::{Alert, AlertType, JobEvent};
use docflow_domain::messaging::{JobMessage, NotificationSink, QueueBroker};
use docflow_domain::repositories::{AuditStore, JobRepository, WorkerRepository};
use docflow_domain::runtime::WorkerLauncher;

/// Mock implementation of JobRepository for testing
#[derive(Clone, Default)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
    failing: Arc<AtomicBool>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let map = jobs.into_iter().map(|job| (job.id.clone(), job)).collect();
        Self {
            jobs: Arc::new(Mutex::new(map)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When set, every call returns a store error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.jobs.lock().unwrap().clear();
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    fn check_failing(&self) -> OrchestratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Store("模拟存储故障".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &Job) -> OrchestratorResult<()> {
        self.check_failing()?;
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(OrchestratorError::Store(format!("作业 {} 已存在", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> OrchestratorResult<Option<Job>> {
        self.check_failing()?;
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn update(&self, job: &Job) -> OrchestratorResult<()> {
        self.check_failing()?;
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(OrchestratorError::JobNotFound {
                id: job.id.clone(),
            });
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: JobStatus) -> OrchestratorResult<Vec<Job>> {
        self.check_failing()?;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn list_by_worker(&self, worker_id: &str) -> OrchestratorResult<Vec<Job>> {
        self.check_failing()?;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.worker_id.as_deref() == Some(worker_id))
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> OrchestratorResult<Vec<Job>> {
        self.check_failing()?;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn query_stale(&self, query: &StaleJobQuery) -> OrchestratorResult<Vec<Job>> {
        self.check_failing()?;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| job.is_recovery_candidate(query))
            .cloned()
            .collect())
    }

    async fn remove(&self, job_id: &str) -> OrchestratorResult<bool> {
        self.check_failing()?;
        Ok(self.jobs.lock().unwrap().remove(job_id).is_some())
    }
}

/// Mock implementation of WorkerRepository for testing
#[derive(Clone, Default)]
pub struct MockWorkerRepository {
    workers: Arc<Mutex<HashMap<String, WorkerRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MockWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(workers: Vec<WorkerRecord>) -> Self {
        let map = workers
            .into_iter()
            .map(|worker| (worker.id.clone(), worker))
            .collect();
        Self {
            workers: Arc::new(Mutex::new(map)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When set, every call returns a store error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }

    pub fn get_all(&self) -> Vec<WorkerRecord> {
        self.workers.lock().unwrap().values().cloned().collect()
    }

    fn check_failing(&self) -> OrchestratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Store("模拟存储故障".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerRepository for MockWorkerRepository {
    async fn register(&self, worker: &WorkerRecord) -> OrchestratorResult<()> {
        self.check_failing()?;
        self.workers
            .lock()
            .unwrap()
            .insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn get(&self, worker_id: &str) -> OrchestratorResult<Option<WorkerRecord>> {
        self.check_failing()?;
        Ok(self.workers.lock().unwrap().get(worker_id).cloned())
    }

    async fn update(&self, worker: &WorkerRecord) -> OrchestratorResult<()> {
        self.check_failing()?;
        self.workers
            .lock()
            .unwrap()
            .insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn list(&self) -> OrchestratorResult<Vec<WorkerRecord>> {
        self.check_failing()?;
        Ok(self.workers.lock().unwrap().values().cloned().collect())
    }

    async fn list_by_tier(&self, tier: TierName) -> OrchestratorResult<Vec<WorkerRecord>> {
        self.check_failing()?;
        Ok(self
            .workers
            .lock()
            .unwrap()
            .values()
            .filter(|worker| worker.tier == tier)
            .cloned()
            .collect())
    }

    async fn remove(&self, worker_id: &str) -> OrchestratorResult<bool> {
        self.check_failing()?;
        Ok(self.workers.lock().unwrap().remove(worker_id).is_some())
    }
}

/// Mock implementation of QueueBroker with priority ordering
#[derive(Clone, Default)]
pub struct MockQueueBroker {
    queues: Arc<Mutex<HashMap<TierName, Vec<(u8, u64, JobMessage)>>>>,
    next_seq: Arc<Mutex<u64>>,
    failing: Arc<AtomicBool>,
}

impl MockQueueBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every call returns a broker error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn total_depth(&self) -> usize {
        self.queues.lock().unwrap().values().map(Vec::len).sum()
    }

    fn check_failing(&self) -> OrchestratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::QueueBroker("模拟队列故障".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueBroker for MockQueueBroker {
    async fn enqueue(
        &self,
        tier: TierName,
        message: &JobMessage,
        priority: u8,
    ) -> OrchestratorResult<usize> {
        self.check_failing()?;
        let mut queues = self.queues.lock().unwrap();
        let mut seq = self.next_seq.lock().unwrap();
        let entries = queues.entry(tier).or_default();
        let position = entries
            .iter()
            .filter(|(p, s, _)| *p < priority || (*p == priority && *s < *seq))
            .count()
            + 1;
        entries.push((priority, *seq, message.clone()));
        *seq += 1;
        Ok(position)
    }

    async fn lease(&self, tier: TierName) -> OrchestratorResult<Option<JobMessage>> {
        self.check_failing()?;
        let mut queues = self.queues.lock().unwrap();
        let entries = match queues.get_mut(&tier) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Ok(None),
        };
        let best = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, (priority, seq, _))| (*priority, *seq))
            .map(|(index, _)| index);
        Ok(best.map(|index| entries.remove(index).2))
    }

    async fn remove(&self, job_id: &str) -> OrchestratorResult<bool> {
        self.check_failing()?;
        let mut queues = self.queues.lock().unwrap();
        for entries in queues.values_mut() {
            let before = entries.len();
            entries.retain(|(_, _, message)| message.job_id != job_id);
            if entries.len() != before {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get(&self, job_id: &str) -> OrchestratorResult<Option<JobMessage>> {
        self.check_failing()?;
        let queues = self.queues.lock().unwrap();
        for entries in queues.values() {
            if let Some((_, _, message)) = entries
                .iter()
                .find(|(_, _, message)| message.job_id == job_id)
            {
                return Ok(Some(message.clone()));
            }
        }
        Ok(None)
    }

    async fn depth(&self, tier: TierName) -> OrchestratorResult<u32> {
        self.check_failing()?;
        Ok(self
            .queues
            .lock()
            .unwrap()
            .get(&tier)
            .map(|entries| entries.len() as u32)
            .unwrap_or(0))
    }

    async fn purge(&self, tier: TierName) -> OrchestratorResult<()> {
        self.check_failing()?;
        self.queues.lock().unwrap().remove(&tier);
        Ok(())
    }
}

/// Mock implementation of AuditStore for testing
#[derive(Clone, Default)]
pub struct MockAuditStore {
    failures: Arc<Mutex<Vec<FailureRecord>>>,
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl MockAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    pub fn all_failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().unwrap().clone()
    }

    pub fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alerts_of_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|alert| alert.alert_type == alert_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditStore for MockAuditStore {
    async fn record_failure(&self, record: &FailureRecord) -> OrchestratorResult<()> {
        self.failures.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn record_recovery_outcome(
        &self,
        record_id: &str,
        succeeded: bool,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let mut failures = self.failures.lock().unwrap();
        let record = failures
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| OrchestratorError::Store(format!("恢复记录 {record_id} 不存在")))?;

        if !record.recovery_attempted {
            record.recovery_attempted = true;
            record.recovery_succeeded = succeeded;
            record.recovered_at = Some(at);
        }
        Ok(())
    }

    async fn record_alert(&self, alert: &Alert) -> OrchestratorResult<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn list_failures_for_job(&self, job_id: &str) -> OrchestratorResult<Vec<FailureRecord>> {
        Ok(self
            .failures
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn recent_alerts(&self, limit: usize) -> OrchestratorResult<Vec<Alert>> {
        let alerts = self.alerts.lock().unwrap();
        Ok(alerts.iter().rev().take(limit).cloned().collect())
    }
}

/// Notification sink that captures everything published to it
#[derive(Clone, Default)]
pub struct CapturingNotificationSink {
    job_events: Arc<Mutex<Vec<JobEvent>>>,
    alerts: Arc<Mutex<Vec<Alert>>>,
    failing: Arc<AtomicBool>,
}

impl CapturingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, publishing fails; callers are expected to swallow the error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn job_events(&self) -> Vec<JobEvent> {
        self.job_events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alerts_of_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|alert| alert.alert_type == alert_type)
            .cloned()
            .collect()
    }

    pub fn events_for_job(&self, job_id: &str) -> Vec<JobEvent> {
        self.job_events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.job_id() == job_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.job_events.lock().unwrap().clear();
        self.alerts.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for CapturingNotificationSink {
    async fn publish_job_event(&self, event: &JobEvent) -> OrchestratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::DependencyFailure(
                "模拟通知通道故障".to_string(),
            ));
        }
        self.job_events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn publish_alert(&self, alert: &Alert) -> OrchestratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrchestratorError::DependencyFailure(
                "模拟通知通道故障".to_string(),
            ));
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Worker launcher that records spawn/stop requests without running anything
#[derive(Clone, Default)]
pub struct MockWorkerLauncher {
    spawned: Arc<Mutex<Vec<TierName>>>,
    stopped: Arc<Mutex<Vec<String>>>,
    counter: Arc<Mutex<u64>>,
}

impl MockWorkerLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned_tiers(&self) -> Vec<TierName> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn stopped_ids(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkerLauncher for MockWorkerLauncher {
    async fn spawn_worker(&self, tier: TierName) -> OrchestratorResult<String> {
        self.spawned.lock().unwrap().push(tier);
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        Ok(format!("mock-worker-{}", *counter))
    }

    async fn stop_worker(&self, worker_id: &str) -> OrchestratorResult<bool> {
        self.stopped.lock().unwrap().push(worker_id.to_string());
        Ok(true)
    }
}
