use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use docflow_core::OrchestratorResult;

use crate::entities::{Job, TierName};
use crate::events::{Alert, JobEvent};

/// 队列消息信封，随作业在分级队列中流转
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub id: String,
    pub job_id: String,
    pub tier: TierName,
    pub priority: u8,
    pub owner_id: String,
    pub payload_ref: String,
    pub size_bytes: u64,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            tier: job.tier,
            priority: job.priority,
            owner_id: job.owner_id.clone(),
            payload_ref: job.payload_ref.clone(),
            size_bytes: job.size_bytes,
            retry_count: job.retry_count,
            enqueued_at: Utc::now(),
        }
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Interface for tiered queue operations
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// 入队，返回消息在该队列中的排位（1起）
    async fn enqueue(
        &self,
        tier: TierName,
        message: &JobMessage,
        priority: u8,
    ) -> OrchestratorResult<usize>;
    /// 按优先级租出下一条消息，空队列返回None
    async fn lease(&self, tier: TierName) -> OrchestratorResult<Option<JobMessage>>;
    async fn remove(&self, job_id: &str) -> OrchestratorResult<bool>;
    async fn get(&self, job_id: &str) -> OrchestratorResult<Option<JobMessage>>;
    async fn depth(&self, tier: TierName) -> OrchestratorResult<u32>;
    async fn purge(&self, tier: TierName) -> OrchestratorResult<()>;
}

/// Interface for outbound notifications, fire-and-forget
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish_job_event(&self, event: &JobEvent) -> OrchestratorResult<()>;
    async fn publish_alert(&self, alert: &Alert) -> OrchestratorResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::JobSubmission;

    #[test]
    fn test_message_round_trip() {
        let submission = JobSubmission {
            job_id: "job-1".to_string(),
            owner_id: "owner-1".to_string(),
            plan: "pro".to_string(),
            payload_ref: "s3://bucket/doc.pdf".to_string(),
            size_bytes: 1024,
        };
        let job = Job::from_submission(&submission, TierName::Premium, 3);
        let message = JobMessage::from_job(&job);

        let bytes = message.serialize_bytes().expect("serialize");
        let restored = JobMessage::deserialize_bytes(&bytes).expect("deserialize");
        assert_eq!(restored.job_id, "job-1");
        assert_eq!(restored.tier, TierName::Premium);
        assert_eq!(restored.priority, 3);
    }
}
