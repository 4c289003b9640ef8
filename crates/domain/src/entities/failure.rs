use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 故障审计记录
///
/// 只追加；恢复结果一经写入便不再修改。
/// 排队超时回收的作业尚无归属Worker，worker_id为空。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: String,
    pub job_id: String,
    pub worker_id: Option<String>,
    pub reason: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    pub recovery_attempted: bool,
    pub recovery_succeeded: bool,
    pub recovered_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    pub fn new(
        job_id: impl Into<String>,
        worker_id: Option<String>,
        reason: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            worker_id,
            reason: reason.into(),
            retry_count,
            failed_at: Utc::now(),
            recovery_attempted: false,
            recovery_succeeded: false,
            recovered_at: None,
        }
    }
}
