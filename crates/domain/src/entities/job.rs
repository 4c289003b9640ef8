use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tier::TierName;

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "DISPATCHED")]
    Dispatched,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RECOVERY_PENDING")]
    RecoveryPending,
    #[serde(rename = "RETRYING")]
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Dispatched => "DISPATCHED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::RecoveryPending => "RECOVERY_PENDING",
            JobStatus::Retrying => "RETRYING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// 恢复处理顺序的状态权重，数值越小越先被重新处理
    pub fn recovery_rank(&self) -> u8 {
        match self {
            JobStatus::RecoveryPending => 0,
            JobStatus::Retrying => 1,
            JobStatus::Processing => 2,
            JobStatus::Queued => 3,
            JobStatus::Dispatched => 4,
            JobStatus::Completed | JobStatus::Failed => 5,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文档处理作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub tier: TierName,
    /// 层级内优先级，数值越小越先调度
    pub priority: u8,
    pub owner_id: String,
    pub payload_ref: String,
    pub size_bytes: u64,
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub retry_count: u32,
    pub progress_percent: u8,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 退避重试的下次入队时间
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Job {
    /// 创建处于queued状态的新作业
    pub fn enqueued(
        id: impl Into<String>,
        tier: TierName,
        priority: u8,
        owner_id: impl Into<String>,
        payload_ref: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            priority,
            owner_id: owner_id.into(),
            payload_ref: payload_ref.into(),
            size_bytes,
            status: JobStatus::Queued,
            worker_id: None,
            retry_count: 0,
            progress_percent: 0,
            enqueued_at: Utc::now(),
            started_at: None,
            last_heartbeat_at: None,
            completed_at: None,
            next_attempt_at: None,
            error_message: None,
        }
    }

    /// 按分级结果从提交请求创建作业
    pub fn from_submission(submission: &JobSubmission, tier: TierName, priority: u8) -> Self {
        Self::enqueued(
            submission.job_id.clone(),
            tier,
            priority,
            submission.owner_id.clone(),
            submission.payload_ref.clone(),
            submission.size_bytes,
        )
    }

    /// 更新状态并维护相关时间戳
    pub fn update_status(&mut self, status: JobStatus) {
        let now = Utc::now();
        match status {
            JobStatus::Processing => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            JobStatus::Completed | JobStatus::Failed => {
                self.completed_at = Some(now);
            }
            _ => {}
        }
        self.status = status;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 心跳更新，只接受更新的时间戳
    pub fn touch_heartbeat(&mut self, at: DateTime<Utc>) {
        match self.last_heartbeat_at {
            Some(current) if current >= at => {}
            _ => self.last_heartbeat_at = Some(at),
        }
    }

    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// 距上次心跳的毫秒数；尚无心跳时返回None
    pub fn heartbeat_age_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_heartbeat_at
            .map(|hb| (now - hb).num_milliseconds())
    }

    pub fn queued_age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.enqueued_at).num_milliseconds()
    }

    /// 判断作业是否属于恢复候选
    pub fn is_recovery_candidate(&self, query: &StaleJobQuery) -> bool {
        match self.status {
            // 上一轮已标记的作业始终是候选
            JobStatus::RecoveryPending => true,
            JobStatus::Retrying => self
                .next_attempt_at
                .map(|due| due <= query.now)
                .unwrap_or(true),
            JobStatus::Processing => match self.heartbeat_age_ms(query.now) {
                Some(age) => age > query.heartbeat_stale_ms,
                // processing却从未上报心跳，按bootstrap阈值判定
                None => self
                    .started_at
                    .map(|s| (query.now - s).num_milliseconds() > query.bootstrap_heartbeat_ms)
                    .unwrap_or(false),
            },
            // 租出后迟迟未开始执行；租约时刻记一次心跳，据此判停滞
            JobStatus::Dispatched => self
                .heartbeat_age_ms(query.now)
                .map(|age| age > query.heartbeat_stale_ms)
                .unwrap_or(false),
            JobStatus::Queued => self.queued_age_ms(query.now) > query.max_queued_wait_ms,
            _ => false,
        }
    }
}

/// 恢复候选扫描条件
#[derive(Debug, Clone)]
pub struct StaleJobQuery {
    pub now: DateTime<Utc>,
    pub heartbeat_stale_ms: i64,
    pub bootstrap_heartbeat_ms: i64,
    pub max_queued_wait_ms: i64,
}

/// 客户端提交请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub job_id: String,
    pub owner_id: String,
    /// 用户套餐名，未知值按最低档处理
    pub plan: String,
    pub payload_ref: String,
    pub size_bytes: u64,
}

/// 入队回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub tier: TierName,
    pub priority: u8,
    /// 入队时刻该层级的等待深度
    pub position: usize,
    /// 重复提交时返回已有作业的回执
    pub deduplicated: bool,
}
