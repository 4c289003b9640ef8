//! 内存仓储实现
//!
//! 嵌入式部署下的作业、Worker与审计存储，读写经RwLock保护的哈希表。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use docflow_core::{OrchestratorError, OrchestratorResult};
use docflow_domain::entities::{
    FailureRecord, Job, JobStatus, StaleJobQuery, TierName, WorkerRecord,
};
use docflow_domain::events::Alert;
use docflow_domain::repositories::{AuditStore, JobRepository, WorkerRepository};

/// 内存作业仓储
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(OrchestratorError::Store(format!("作业 {} 已存在", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> OrchestratorResult<Option<Job>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job: &Job) -> OrchestratorResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(OrchestratorError::JobNotFound {
                id: job.id.clone(),
            });
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list_by_status(&self, status: JobStatus) -> OrchestratorResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn list_by_worker(&self, worker_id: &str) -> OrchestratorResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.worker_id.as_deref() == Some(worker_id))
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> OrchestratorResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn query_stale(&self, query: &StaleJobQuery) -> OrchestratorResult<Vec<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_recovery_candidate(query))
            .cloned()
            .collect())
    }

    async fn remove(&self, job_id: &str) -> OrchestratorResult<bool> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }
}

/// 内存Worker仓储
#[derive(Default)]
pub struct InMemoryWorkerRepository {
    workers: Arc<RwLock<HashMap<String, WorkerRecord>>>,
}

impl InMemoryWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRepository for InMemoryWorkerRepository {
    async fn register(&self, worker: &WorkerRecord) -> OrchestratorResult<()> {
        self.workers
            .write()
            .await
            .insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn get(&self, worker_id: &str) -> OrchestratorResult<Option<WorkerRecord>> {
        Ok(self.workers.read().await.get(worker_id).cloned())
    }

    async fn update(&self, worker: &WorkerRecord) -> OrchestratorResult<()> {
        // 覆盖语义，注册与更新共用一条路径
        self.workers
            .write()
            .await
            .insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn list(&self) -> OrchestratorResult<Vec<WorkerRecord>> {
        Ok(self.workers.read().await.values().cloned().collect())
    }

    async fn list_by_tier(&self, tier: TierName) -> OrchestratorResult<Vec<WorkerRecord>> {
        Ok(self
            .workers
            .read()
            .await
            .values()
            .filter(|worker| worker.tier == tier)
            .cloned()
            .collect())
    }

    async fn remove(&self, worker_id: &str) -> OrchestratorResult<bool> {
        Ok(self.workers.write().await.remove(worker_id).is_some())
    }
}

/// 内存审计存储，只追加
#[derive(Default)]
pub struct InMemoryAuditStore {
    failures: Arc<RwLock<Vec<FailureRecord>>>,
    alerts: Arc<RwLock<Vec<Alert>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn failure_count(&self) -> usize {
        self.failures.read().await.len()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record_failure(&self, record: &FailureRecord) -> OrchestratorResult<()> {
        self.failures.write().await.push(record.clone());
        Ok(())
    }

    async fn record_recovery_outcome(
        &self,
        record_id: &str,
        succeeded: bool,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let mut failures = self.failures.write().await;
        let record = failures
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| {
                OrchestratorError::Store(format!("恢复记录 {record_id} 不存在"))
            })?;

        if record.recovery_attempted {
            // 结果只回写一次，后续写入忽略
            debug!("恢复记录 {} 已有结果，忽略重复回写", record_id);
            return Ok(());
        }
        record.recovery_attempted = true;
        record.recovery_succeeded = succeeded;
        record.recovered_at = Some(at);
        Ok(())
    }

    async fn record_alert(&self, alert: &Alert) -> OrchestratorResult<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn list_failures_for_job(&self, job_id: &str) -> OrchestratorResult<Vec<FailureRecord>> {
        Ok(self
            .failures
            .read()
            .await
            .iter()
            .filter(|record| record.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn recent_alerts(&self, limit: usize) -> OrchestratorResult<Vec<Alert>> {
        let alerts = self.alerts.read().await;
        Ok(alerts.iter().rev().take(limit).cloned().collect())
    }
}
