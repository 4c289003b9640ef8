//! 文档提取端口
//!
//! 提取服务是外部依赖，Worker只通过熔断器调用它；
//! 内嵌模式和测试使用模拟实现。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use docflow_core::OrchestratorResult;
use docflow_domain::{JobMessage, TierName};

/// 提取请求，从租到的队列消息构造
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub job_id: String,
    pub owner_id: String,
    pub payload_ref: String,
    pub size_bytes: u64,
    pub tier: TierName,
    /// 进度回报句柄，实现可忽略
    pub progress: ProgressReporter,
}

impl ExtractionRequest {
    pub fn from_message(message: &JobMessage, progress: ProgressReporter) -> Self {
        Self {
            job_id: message.job_id.clone(),
            owner_id: message.owner_id.clone(),
            payload_ref: message.payload_ref.clone(),
            size_bytes: message.size_bytes,
            tier: message.tier,
            progress,
        }
    }
}

/// 提取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub job_id: String,
    pub pages: u32,
    pub characters: u64,
    pub summary: String,
}

/// 提取进度回报，尽力送达
///
/// 通道满或已关闭时直接丢弃，进度丢失不影响作业结果。
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<u8>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<u8>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 不回报任何进度的空句柄
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, percent: u8) {
        if let Some(tx) = &self.tx {
            if tx.try_send(percent.min(100)).is_err() {
                debug!("进度通道不可用，丢弃进度 {}%", percent);
            }
        }
    }
}

/// 文档内容提取端口
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> OrchestratorResult<ExtractionOutput>;
}

/// 模拟提取器
///
/// 按文档大小推算耗时，分阶段（读取、解析、汇总）回报进度，
/// 产出确定性的页数与字符数，供内嵌运行和测试使用。
pub struct SimulatedExtractor {
    base_latency_ms: u64,
    per_megabyte_ms: u64,
}

impl SimulatedExtractor {
    pub fn new() -> Self {
        Self {
            base_latency_ms: 50,
            per_megabyte_ms: 20,
        }
    }

    /// 指定时长参数，测试用0可让提取瞬时完成
    pub fn with_timings(base_latency_ms: u64, per_megabyte_ms: u64) -> Self {
        Self {
            base_latency_ms,
            per_megabyte_ms,
        }
    }

    fn total_duration_ms(&self, size_bytes: u64) -> u64 {
        let megabytes = size_bytes / (1024 * 1024);
        self.base_latency_ms + megabytes * self.per_megabyte_ms
    }
}

impl Default for SimulatedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentExtractor for SimulatedExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> OrchestratorResult<ExtractionOutput> {
        let stage_ms = self.total_duration_ms(request.size_bytes) / 3;

        // 读取 -> 解析 -> 汇总
        for percent in [30u8, 60, 90] {
            if stage_ms > 0 {
                tokio::time::sleep(Duration::from_millis(stage_ms)).await;
            }
            request.progress.report(percent);
        }

        // 约4KB一页的确定性估算
        let pages = (request.size_bytes / 4096).max(1) as u32;
        let characters = pages as u64 * 1800;

        Ok(ExtractionOutput {
            job_id: request.job_id.clone(),
            pages,
            characters,
            summary: format!("提取完成: {pages}页, 约{characters}字符"),
        })
    }
}
