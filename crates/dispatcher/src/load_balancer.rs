//! 负载均衡器
//!
//! 基于Worker状态快照做三件事：为层级挑选下一个Worker、
//! 判定Worker过载/低载、汇总出伸缩建议。自身不落任何状态变更，
//! 伸缩建议通过集群命令通道交给ClusterManager执行。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use docflow_domain::{
    OrchestratorResult, TierName, WorkerRecord, WorkerRepository,
};

use crate::cluster::ClusterCommand;
use crate::strategies::{SelectionStrategy, StrategyKind, StrategyTuning};

/// 过载/低载判定阈值
#[derive(Debug, Clone)]
pub struct LoadBalancerConfig {
    /// 在手作业心跳停滞多久算过载
    pub stall_threshold_ms: i64,
    /// 平均处理耗时超过多少算过载
    pub slow_processing_ms: f64,
    /// 错误计入过载判定的时间窗口
    pub recent_error_window_ms: i64,
    /// 空闲多久才可能被判低载
    pub idle_threshold_ms: i64,
    /// 累计完成数低于该值才可能被判低载
    pub low_activity_threshold: u64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            stall_threshold_ms: 30_000,
            slow_processing_ms: 120_000.0,
            recent_error_window_ms: 300_000,
            idle_threshold_ms: 600_000,
            low_activity_threshold: 5,
        }
    }
}

/// 伸缩建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    Maintain,
}

/// 一轮负载评估的结论
#[derive(Debug, Clone, Serialize)]
pub struct LoadDecision {
    pub action: ScaleAction,
    pub reason: String,
    /// 触发该建议的Worker数量
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerStats {
    pub algorithm: String,
    pub total_workers: usize,
    pub overloaded_workers: usize,
    pub underloaded_workers: usize,
}

struct ActiveStrategy {
    kind: StrategyKind,
    strategy: Arc<dyn SelectionStrategy>,
}

pub struct LoadBalancer {
    worker_repository: Arc<dyn WorkerRepository>,
    active: RwLock<ActiveStrategy>,
    tuning: StrategyTuning,
    config: LoadBalancerConfig,
    cluster_tx: mpsc::Sender<ClusterCommand>,
}

impl LoadBalancer {
    pub fn new(
        worker_repository: Arc<dyn WorkerRepository>,
        config: LoadBalancerConfig,
        tuning: StrategyTuning,
        cluster_tx: mpsc::Sender<ClusterCommand>,
    ) -> Self {
        let kind = StrategyKind::WeightedRoundRobin;
        let strategy = kind.build(tuning.clone());
        Self {
            worker_repository,
            active: RwLock::new(ActiveStrategy { kind, strategy }),
            tuning,
            config,
            cluster_tx,
        }
    }

    /// 为层级挑选下一个Worker
    ///
    /// 任何环节失败都返回None而不是错误：选不出Worker时作业继续
    /// 留在队列里等下一轮，比让调用方处理错误更稳妥。
    pub async fn select_worker(&self, tier: TierName) -> Option<WorkerRecord> {
        let workers = match self.worker_repository.list_by_tier(tier).await {
            Ok(workers) => workers,
            Err(e) => {
                warn!("获取 {} 层Worker列表失败: {}", tier, e);
                return None;
            }
        };

        let strategy = self.active.read().await.strategy.clone();
        match strategy.select_worker(tier, &workers).await {
            Ok(selected) => selected,
            Err(e) => {
                warn!("{} 层Worker选择失败: {}", tier, e);
                None
            }
        }
    }

    /// 过载判定：在手作业心跳停滞、平均处理过慢、近期出错，任一命中
    pub fn is_worker_overloaded(&self, worker: &WorkerRecord) -> bool {
        let now = Utc::now();

        if worker.current_job_id.is_some()
            && worker.heartbeat_age_ms(now) > self.config.stall_threshold_ms
        {
            return true;
        }

        if worker.avg_processing_ms > self.config.slow_processing_ms {
            return true;
        }

        if let Some(at) = worker.last_error_at {
            if (now - at).num_milliseconds() <= self.config.recent_error_window_ms {
                return true;
            }
        }

        false
    }

    /// 低载判定：空闲足够久且累计完成数很低，是缩容候选
    pub fn is_worker_underloaded(&self, worker: &WorkerRecord) -> bool {
        if !worker.is_available() {
            return false;
        }
        let now = Utc::now();
        worker.idle_duration_ms(now) > self.config.idle_threshold_ms
            && worker.jobs_completed_total < self.config.low_activity_threshold
    }

    /// 汇总所有Worker的负载状况，给出一条伸缩建议
    ///
    /// 指标获取失败时回答"维持现状"。负载均衡是优化手段，
    /// 它的故障不允许演变成集群动作。
    pub async fn detect_and_redistribute(&self) -> LoadDecision {
        let workers = match self.worker_repository.list().await {
            Ok(workers) => workers,
            Err(e) => {
                warn!("获取Worker指标失败，本轮维持现状: {}", e);
                return LoadDecision {
                    action: ScaleAction::Maintain,
                    reason: "error".to_string(),
                    count: 0,
                };
            }
        };

        let active: Vec<&WorkerRecord> = workers.iter().filter(|w| w.is_active()).collect();
        let overloaded = active
            .iter()
            .filter(|w| self.is_worker_overloaded(w))
            .count();
        let underloaded = active
            .iter()
            .filter(|w| self.is_worker_underloaded(w))
            .count();

        if overloaded > 0 {
            info!("检测到 {} 个过载Worker，建议扩容", overloaded);
            LoadDecision {
                action: ScaleAction::ScaleUp,
                reason: "overloaded_workers".to_string(),
                count: overloaded,
            }
        } else if underloaded > 0 {
            info!("检测到 {} 个低载Worker，建议缩容", underloaded);
            LoadDecision {
                action: ScaleAction::ScaleDown,
                reason: "underloaded_workers".to_string(),
                count: underloaded,
            }
        } else {
            LoadDecision {
                action: ScaleAction::Maintain,
                reason: "stable".to_string(),
                count: 0,
            }
        }
    }

    /// Worker故障后的路由侧处理
    ///
    /// 重置该层轮询游标，陈旧下标会系统性跳过替补Worker；
    /// 若该层已无可用Worker，向集群请求补充一个。
    pub async fn handle_worker_failure(&self, worker_id: &str) -> OrchestratorResult<()> {
        let worker = match self.worker_repository.get(worker_id).await? {
            Some(worker) => worker,
            None => {
                warn!("故障Worker {} 不在注册表中，跳过路由清理", worker_id);
                return Ok(());
            }
        };

        self.active.read().await.strategy.reset_cursor(worker.tier);

        let remaining = self
            .worker_repository
            .list_by_tier(worker.tier)
            .await?
            .into_iter()
            .filter(|w| w.id != worker_id && w.is_active())
            .count();

        if remaining == 0 {
            info!("{} 层已无可用Worker，请求补充", worker.tier);
            if let Err(e) = self
                .cluster_tx
                .send(ClusterCommand::SpawnWorker { tier: worker.tier })
                .await
            {
                warn!("补充Worker请求发送失败: {}", e);
            }
        }

        Ok(())
    }

    /// 切换选择算法，未知名称拒绝并保留当前算法
    pub async fn set_algorithm(&self, name: &str) -> OrchestratorResult<()> {
        let kind: StrategyKind = name.parse()?;

        let mut active = self.active.write().await;
        if active.kind == kind {
            return Ok(());
        }
        active.strategy = kind.build(self.tuning.clone());
        active.kind = kind;
        info!("负载均衡算法切换为 {}", kind);
        Ok(())
    }

    pub async fn get_stats(&self) -> OrchestratorResult<LoadBalancerStats> {
        let workers = self.worker_repository.list().await?;
        let overloaded = workers
            .iter()
            .filter(|w| w.is_active() && self.is_worker_overloaded(w))
            .count();
        let underloaded = workers
            .iter()
            .filter(|w| self.is_worker_underloaded(w))
            .count();
        let kind = self.active.read().await.kind;

        Ok(LoadBalancerStats {
            algorithm: kind.to_string(),
            total_workers: workers.len(),
            overloaded_workers: overloaded,
            underloaded_workers: underloaded,
        })
    }
}
