//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use docflow_core::OrchestratorResult;

use crate::entities::{FailureRecord, Job, JobStatus, StaleJobQuery, TierName, WorkerRecord};
use crate::events::Alert;

/// 作业仓储抽象
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> OrchestratorResult<()>;
    async fn get(&self, job_id: &str) -> OrchestratorResult<Option<Job>>;
    async fn update(&self, job: &Job) -> OrchestratorResult<()>;
    async fn list_by_status(&self, status: JobStatus) -> OrchestratorResult<Vec<Job>>;
    async fn list_by_worker(&self, worker_id: &str) -> OrchestratorResult<Vec<Job>>;
    /// 所有未达终态的作业
    async fn list_active(&self) -> OrchestratorResult<Vec<Job>>;
    /// 按失联判定规则筛选待恢复作业
    async fn query_stale(&self, query: &StaleJobQuery) -> OrchestratorResult<Vec<Job>>;
    async fn remove(&self, job_id: &str) -> OrchestratorResult<bool>;
}

/// Worker仓储抽象
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn register(&self, worker: &WorkerRecord) -> OrchestratorResult<()>;
    async fn get(&self, worker_id: &str) -> OrchestratorResult<Option<WorkerRecord>>;
    /// 已存在则覆盖，不存在则插入
    async fn update(&self, worker: &WorkerRecord) -> OrchestratorResult<()>;
    async fn list(&self) -> OrchestratorResult<Vec<WorkerRecord>>;
    async fn list_by_tier(&self, tier: TierName) -> OrchestratorResult<Vec<WorkerRecord>>;
    async fn remove(&self, worker_id: &str) -> OrchestratorResult<bool>;
}

/// 审计存储抽象，只追加
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_failure(&self, record: &FailureRecord) -> OrchestratorResult<()>;
    /// 回写恢复结果，同一条记录只接受一次回写
    async fn record_recovery_outcome(
        &self,
        record_id: &str,
        succeeded: bool,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<()>;
    async fn record_alert(&self, alert: &Alert) -> OrchestratorResult<()>;
    async fn list_failures_for_job(&self, job_id: &str) -> OrchestratorResult<Vec<FailureRecord>>;
    async fn recent_alerts(&self, limit: usize) -> OrchestratorResult<Vec<Alert>>;
}
