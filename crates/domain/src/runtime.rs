//! Worker运行时端口
//!
//! 集群管理器通过该端口创建与停止Worker，不感知具体运行时形态。

use async_trait::async_trait;

use docflow_core::OrchestratorResult;

use crate::entities::TierName;

/// Worker生命周期抽象
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// 启动一个归属指定层级的Worker，返回其ID
    async fn spawn_worker(&self, tier: TierName) -> OrchestratorResult<String>;
    /// 请求停止Worker，未知ID返回false
    async fn stop_worker(&self, worker_id: &str) -> OrchestratorResult<bool>;
}
