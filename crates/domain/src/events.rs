//! 领域事件
//!
//! 作业生命周期事件与运维告警，经通知端口对外发布；
//! Worker运行时事件经内部通道送往状态监听器。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{TierName, WorkerMetrics};

/// 作业生命周期事件（对外发布，尽力送达）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Queued {
        job_id: String,
        tier: TierName,
        priority: u8,
        position: usize,
        occurred_at: DateTime<Utc>,
    },
    Started {
        job_id: String,
        worker_id: String,
        occurred_at: DateTime<Utc>,
    },
    Progress {
        job_id: String,
        percent: u8,
        occurred_at: DateTime<Utc>,
    },
    Completed {
        job_id: String,
        worker_id: String,
        processing_ms: u64,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        job_id: String,
        reason: String,
        retryable: bool,
        occurred_at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn queued(job_id: impl Into<String>, tier: TierName, priority: u8, position: usize) -> Self {
        JobEvent::Queued {
            job_id: job_id.into(),
            tier,
            priority,
            position,
            occurred_at: Utc::now(),
        }
    }

    pub fn started(job_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        JobEvent::Started {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn progress(job_id: impl Into<String>, percent: u8) -> Self {
        JobEvent::Progress {
            job_id: job_id.into(),
            percent,
            occurred_at: Utc::now(),
        }
    }

    pub fn completed(
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        processing_ms: u64,
    ) -> Self {
        JobEvent::Completed {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            processing_ms,
            occurred_at: Utc::now(),
        }
    }

    pub fn failed(job_id: impl Into<String>, reason: impl Into<String>, retryable: bool) -> Self {
        JobEvent::Failed {
            job_id: job_id.into(),
            reason: reason.into(),
            retryable,
            occurred_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Queued { job_id, .. } => job_id,
            JobEvent::Started { job_id, .. } => job_id,
            JobEvent::Progress { job_id, .. } => job_id,
            JobEvent::Completed { job_id, .. } => job_id,
            JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Queued { .. } => "queued",
            JobEvent::Started { .. } => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
        }
    }
}

/// 告警类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    #[serde(rename = "worker_failure")]
    WorkerFailure,
    #[serde(rename = "high_queue_length")]
    HighQueueLength,
    #[serde(rename = "circuit_breaker_open")]
    CircuitBreakerOpen,
    #[serde(rename = "job_timeout")]
    JobTimeout,
    #[serde(rename = "job_failed")]
    JobFailed,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::WorkerFailure => "worker_failure",
            AlertType::HighQueueLength => "high_queue_length",
            AlertType::CircuitBreakerOpen => "circuit_breaker_open",
            AlertType::JobTimeout => "job_timeout",
            AlertType::JobFailed => "job_failed",
        }
    }
}

impl std::str::FromStr for AlertType {
    type Err = docflow_core::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker_failure" => Ok(AlertType::WorkerFailure),
            "high_queue_length" => Ok(AlertType::HighQueueLength),
            "circuit_breaker_open" => Ok(AlertType::CircuitBreakerOpen),
            "job_timeout" => Ok(AlertType::JobTimeout),
            "job_failed" => Ok(AlertType::JobFailed),
            other => Err(docflow_core::OrchestratorError::Serialization(format!(
                "未知告警类型: {other}"
            ))),
        }
    }
}

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warning")]
    Warning,
    #[serde(rename = "critical")]
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = docflow_core::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(docflow_core::OrchestratorError::Serialization(format!(
                "未知告警级别: {other}"
            ))),
        }
    }
}

/// 运维告警
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_type,
            severity,
            message: message.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    pub fn critical(
        alert_type: AlertType,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::new(alert_type, AlertSeverity::Critical, message, metadata)
    }

    pub fn warning(
        alert_type: AlertType,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::new(alert_type, AlertSeverity::Warning, message, metadata)
    }
}

/// Worker运行时事件，由状态监听器串行消费
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerEvent {
    Heartbeat(WorkerMetrics),
    /// Worker从队列租到消息、尚未开始执行
    JobLeased {
        worker_id: String,
        job_id: String,
        occurred_at: DateTime<Utc>,
    },
    JobStarted {
        worker_id: String,
        job_id: String,
        occurred_at: DateTime<Utc>,
    },
    JobProgress {
        worker_id: String,
        job_id: String,
        percent: u8,
        occurred_at: DateTime<Utc>,
    },
    JobCompleted {
        worker_id: String,
        job_id: String,
        processing_ms: u64,
        occurred_at: DateTime<Utc>,
    },
    JobFailed {
        worker_id: String,
        job_id: String,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl WorkerEvent {
    pub fn heartbeat(metrics: WorkerMetrics) -> Self {
        WorkerEvent::Heartbeat(metrics)
    }

    pub fn job_leased(worker_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        WorkerEvent::JobLeased {
            worker_id: worker_id.into(),
            job_id: job_id.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn job_started(worker_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        WorkerEvent::JobStarted {
            worker_id: worker_id.into(),
            job_id: job_id.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn job_progress(
        worker_id: impl Into<String>,
        job_id: impl Into<String>,
        percent: u8,
    ) -> Self {
        WorkerEvent::JobProgress {
            worker_id: worker_id.into(),
            job_id: job_id.into(),
            percent,
            occurred_at: Utc::now(),
        }
    }

    pub fn job_completed(
        worker_id: impl Into<String>,
        job_id: impl Into<String>,
        processing_ms: u64,
    ) -> Self {
        WorkerEvent::JobCompleted {
            worker_id: worker_id.into(),
            job_id: job_id.into(),
            processing_ms,
            occurred_at: Utc::now(),
        }
    }

    pub fn job_failed(
        worker_id: impl Into<String>,
        job_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        WorkerEvent::JobFailed {
            worker_id: worker_id.into(),
            job_id: job_id.into(),
            reason: reason.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn worker_id(&self) -> &str {
        match self {
            WorkerEvent::Heartbeat(metrics) => &metrics.worker_id,
            WorkerEvent::JobLeased { worker_id, .. } => worker_id,
            WorkerEvent::JobStarted { worker_id, .. } => worker_id,
            WorkerEvent::JobProgress { worker_id, .. } => worker_id,
            WorkerEvent::JobCompleted { worker_id, .. } => worker_id,
            WorkerEvent::JobFailed { worker_id, .. } => worker_id,
        }
    }
}
