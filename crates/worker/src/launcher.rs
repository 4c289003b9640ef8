//! Worker运行时启动器
//!
//! 集群管理器通过WorkerLauncher端口创建与停止Worker，
//! 本实现把每个Worker作为tokio任务组运行在编排进程内。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use docflow_core::{CircuitBreaker, OrchestratorResult, WorkerConfig};
use docflow_domain::{QueueBroker, TierName, WorkerEvent, WorkerLauncher};
use uuid::Uuid;

use crate::extractor::DocumentExtractor;
use crate::service::DocumentWorker;

/// 进程内Worker启动器
///
/// 所有Worker共享同一个提取服务熔断器，熔断状态对依赖而言是
/// 全局一份，不按Worker分裂。
pub struct TokioWorkerLauncher {
    config: WorkerConfig,
    broker: Arc<dyn QueueBroker>,
    extractor: Arc<dyn DocumentExtractor>,
    breaker: Arc<CircuitBreaker>,
    event_tx: mpsc::Sender<WorkerEvent>,
    workers: RwLock<HashMap<String, DocumentWorker>>,
}

impl TokioWorkerLauncher {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn QueueBroker>,
        extractor: Arc<dyn DocumentExtractor>,
        breaker: Arc<CircuitBreaker>,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            config,
            broker,
            extractor,
            breaker,
            event_tx,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// 当前托管的Worker数
    pub async fn active_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// 停机时停掉所有Worker
    pub async fn stop_all(&self) {
        let workers: Vec<DocumentWorker> = {
            let mut guard = self.workers.write().await;
            guard.drain().map(|(_, worker)| worker).collect()
        };
        for worker in workers {
            if let Err(e) = worker.stop().await {
                warn!("停止Worker {} 失败: {}", worker.worker_id(), e);
            }
        }
    }
}

#[async_trait]
impl WorkerLauncher for TokioWorkerLauncher {
    async fn spawn_worker(&self, tier: TierName) -> OrchestratorResult<String> {
        let suffix = Uuid::new_v4().simple().to_string();
        let worker_id = format!("worker-{}-{}", tier, &suffix[..8]);

        let worker = DocumentWorker::new(
            worker_id.clone(),
            tier,
            self.config.clone(),
            Arc::clone(&self.broker),
            Arc::clone(&self.extractor),
            Arc::clone(&self.breaker),
            self.event_tx.clone(),
        );
        worker.start().await?;

        let mut workers = self.workers.write().await;
        workers.insert(worker_id.clone(), worker);
        info!("已为 {} 层启动Worker运行时: {}", tier, worker_id);
        Ok(worker_id)
    }

    async fn stop_worker(&self, worker_id: &str) -> OrchestratorResult<bool> {
        let worker = {
            let mut workers = self.workers.write().await;
            workers.remove(worker_id)
        };

        match worker {
            Some(worker) => {
                worker.stop().await?;
                Ok(true)
            }
            None => {
                debug!("请求停止的Worker {} 不在托管列表", worker_id);
                Ok(false)
            }
        }
    }
}
