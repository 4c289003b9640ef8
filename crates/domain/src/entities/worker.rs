use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::tier::TierName;

/// Worker状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    #[serde(rename = "STARTING")]
    Starting,
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "OVERLOADED")]
    Overloaded,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "RECOVERING")]
    Recovering,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "STARTING",
            WorkerState::Idle => "IDLE",
            WorkerState::Processing => "PROCESSING",
            WorkerState::Overloaded => "OVERLOADED",
            WorkerState::Error => "ERROR",
            WorkerState::Recovering => "RECOVERING",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker心跳指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub worker_id: String,
    pub current_job_id: Option<String>,
    pub avg_processing_ms: f64,
    pub jobs_completed_total: u64,
    pub timestamp: DateTime<Utc>,
}

/// Worker节点记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,
    pub tier: TierName,
    pub hostname: String,
    pub status: WorkerState,
    pub current_job_id: Option<String>,
    /// 滚动平均处理耗时；0表示尚无完成记录
    pub avg_processing_ms: f64,
    pub jobs_completed_total: u64,
    /// 最近完成时间，用于统计每小时完成数，超过一小时的条目会被修剪
    pub recent_completions: Vec<DateTime<Utc>>,
    pub last_heartbeat: DateTime<Utc>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// 创建新的Worker记录，初始状态为starting
    pub fn new(id: impl Into<String>, tier: TierName, hostname: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tier,
            hostname: hostname.into(),
            status: WorkerState::Starting,
            current_job_id: None,
            avg_processing_ms: 0.0,
            jobs_completed_total: 0,
            recent_completions: Vec::new(),
            last_heartbeat: now,
            last_error_at: None,
            last_completed_at: None,
            registered_at: now,
        }
    }

    /// 是否可以接收新作业
    pub fn is_available(&self) -> bool {
        matches!(self.status, WorkerState::Idle)
    }

    /// 是否参与集群统计（error和recovering之外的状态）
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            WorkerState::Starting
                | WorkerState::Idle
                | WorkerState::Processing
                | WorkerState::Overloaded
        )
    }

    pub fn is_busy(&self) -> bool {
        self.current_job_id.is_some()
    }

    /// 分配作业；维护 current_job_id 与状态的一致性约束
    pub fn assign_job(&mut self, job_id: impl Into<String>) {
        self.current_job_id = Some(job_id.into());
        self.status = WorkerState::Processing;
    }

    /// 清除作业占用并回到idle
    pub fn clear_assignment(&mut self) {
        self.current_job_id = None;
        if matches!(
            self.status,
            WorkerState::Processing | WorkerState::Overloaded
        ) {
            self.status = WorkerState::Idle;
        }
    }

    /// 应用心跳，只接受更新的时间戳
    pub fn update_heartbeat(&mut self, metrics: &WorkerMetrics) {
        if metrics.timestamp <= self.last_heartbeat && self.status != WorkerState::Starting {
            return;
        }
        self.last_heartbeat = metrics.timestamp;
        self.current_job_id = metrics.current_job_id.clone();
        if metrics.avg_processing_ms > 0.0 {
            self.avg_processing_ms = metrics.avg_processing_ms;
        }
        self.jobs_completed_total = self.jobs_completed_total.max(metrics.jobs_completed_total);
        // 心跳到达说明进程存活；error状态的恢复由协调器决定，不在这里翻转
        if !matches!(self.status, WorkerState::Error | WorkerState::Recovering) {
            self.status = if self.current_job_id.is_some() {
                WorkerState::Processing
            } else {
                WorkerState::Idle
            };
        }
    }

    /// 记录一次作业完成并更新滚动平均耗时
    pub fn record_completion(&mut self, processing_ms: u64, at: DateTime<Utc>) {
        self.jobs_completed_total += 1;
        let n = self.jobs_completed_total as f64;
        if self.avg_processing_ms <= 0.0 {
            self.avg_processing_ms = processing_ms as f64;
        } else {
            self.avg_processing_ms =
                (self.avg_processing_ms * (n - 1.0) + processing_ms as f64) / n;
        }
        self.recent_completions.push(at);
        self.prune_completions(at);
        self.last_completed_at = Some(at);
        self.clear_assignment();
    }

    pub fn record_error(&mut self, at: DateTime<Utc>) {
        self.last_error_at = Some(at);
        self.status = WorkerState::Error;
    }

    /// 最近一小时完成的作业数
    pub fn jobs_completed_last_hour(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::hours(1);
        self.recent_completions
            .iter()
            .filter(|&&at| at > cutoff)
            .count()
    }

    fn prune_completions(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(1);
        self.recent_completions.retain(|&at| at > cutoff);
    }

    pub fn heartbeat_age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_heartbeat).num_milliseconds()
    }

    pub fn is_heartbeat_expired(&self, timeout_ms: i64) -> bool {
        self.heartbeat_age_ms(Utc::now()) > timeout_ms
    }

    /// 空闲时长：自最近一次完成（或注册）以来的毫秒数
    pub fn idle_duration_ms(&self, now: DateTime<Utc>) -> i64 {
        let since = self.last_completed_at.unwrap_or(self.registered_at);
        (now - since).num_milliseconds()
    }
}
