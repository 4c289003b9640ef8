//! 弹性Worker池管理
//!
//! 负责Worker的生命周期：按层级创建与停止Worker、汇总心跳指标、
//! 周期性健康检查与伸缩评估。健康检查只做检测，失联Worker通过
//! 故障信号通道移交恢复协调器处置；伸缩动作受冷却期与重入护栏
//! 约束，并发触发被合并而不是排队。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use docflow_core::{AppConfig, ClusterConfig, QueueConfig, TierSettings};
use docflow_domain::{
    OrchestratorResult, QueueBroker, TierName, WorkerLauncher, WorkerMetrics, WorkerRecord,
    WorkerRepository, WorkerState,
};
use docflow_infrastructure::MetricsCollector;

/// 集群侧的执行命令，由负载均衡器与恢复协调器发来
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCommand {
    SpawnWorker { tier: TierName },
    StopWorker { worker_id: String },
}

/// 健康检查发现的失联Worker，交恢复协调器处置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailureSignal {
    pub worker_id: String,
    pub reason: String,
}

/// 集群整体健康状况，仅作观测输出
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub total_workers: usize,
    pub active_workers: usize,
    pub error_workers: usize,
    /// 有任何Worker处于ERROR状态即为不健康
    pub is_healthy: bool,
    /// 所有非零样本的平均处理耗时
    pub avg_processing_ms: f64,
}

/// 单层级一轮伸缩评估的结论
#[derive(Debug, Clone, Serialize)]
pub struct TierScaleAssessment {
    pub tier: TierName,
    pub waiting: u32,
    pub active_workers: usize,
    pub busy_workers: usize,
    pub recommended_workers: usize,
}

pub struct ClusterManager {
    launcher: Arc<dyn WorkerLauncher>,
    worker_repository: Arc<dyn WorkerRepository>,
    broker: Arc<dyn QueueBroker>,
    metrics: Arc<MetricsCollector>,
    cluster_config: ClusterConfig,
    queue_config: QueueConfig,
    /// Worker心跳超过该时长视为失联
    heartbeat_stale_ms: i64,
    hostname: String,
    failure_tx: mpsc::Sender<WorkerFailureSignal>,
    command_rx: Mutex<Option<mpsc::Receiver<ClusterCommand>>>,
    is_scaling: AtomicBool,
    last_scale_action: RwLock<Option<DateTime<Utc>>>,
    running: RwLock<bool>,
}

impl ClusterManager {
    pub fn new(
        config: &AppConfig,
        launcher: Arc<dyn WorkerLauncher>,
        worker_repository: Arc<dyn WorkerRepository>,
        broker: Arc<dyn QueueBroker>,
        metrics: Arc<MetricsCollector>,
        failure_tx: mpsc::Sender<WorkerFailureSignal>,
        command_rx: mpsc::Receiver<ClusterCommand>,
    ) -> Self {
        let hostname = config.worker.hostname.clone().unwrap_or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .unwrap_or_else(|| "unknown-host".to_string())
        });

        Self {
            launcher,
            worker_repository,
            broker,
            metrics,
            cluster_config: config.cluster.clone(),
            queue_config: config.queue.clone(),
            heartbeat_stale_ms: config.recovery.heartbeat_stale_ms as i64,
            hostname,
            failure_tx,
            command_rx: Mutex::new(Some(command_rx)),
            is_scaling: AtomicBool::new(false),
            last_scale_action: RwLock::new(None),
            running: RwLock::new(false),
        }
    }

    /// 启动集群：置运行标志并补足各层级的最低Worker数
    ///
    /// 周期循环（健康检查、伸缩评估、命令消费）由调用方在独立任务中
    /// 运行对应的`run_*`方法。
    pub async fn start(&self) -> OrchestratorResult<()> {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("集群管理器启动");
        self.ensure_min_workers().await;
        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("集群管理器停止");
    }

    fn tier_settings(&self, tier: TierName) -> &TierSettings {
        match tier {
            TierName::Premium => &self.queue_config.premium,
            TierName::Normal => &self.queue_config.normal,
            TierName::Large => &self.queue_config.large,
        }
    }

    /// 创建一个Worker并登记其记录
    pub async fn create_worker(&self, tier: TierName) -> OrchestratorResult<String> {
        let worker_id = self.launcher.spawn_worker(tier).await?;
        let record = WorkerRecord::new(worker_id.clone(), tier, self.hostname.clone());
        self.worker_repository.register(&record).await?;
        info!("已创建 {} 层Worker: {}", tier, worker_id);
        Ok(worker_id)
    }

    /// 停止一个Worker，只停空闲的，绝不打断在手作业
    pub async fn stop_worker(&self, worker_id: &str) -> OrchestratorResult<bool> {
        let worker = match self.worker_repository.get(worker_id).await? {
            Some(worker) => worker,
            None => {
                warn!("请求停止的Worker {} 不存在", worker_id);
                return Ok(false);
            }
        };

        if !worker.is_available() {
            debug!(
                "Worker {} 当前状态为 {}，不满足停止条件",
                worker_id, worker.status
            );
            return Ok(false);
        }

        if !self.launcher.stop_worker(worker_id).await? {
            warn!("运行时不认识Worker {}，仍清除其记录", worker_id);
        }
        self.worker_repository.remove(worker_id).await?;
        info!("已停止 {} 层Worker: {}", worker.tier, worker_id);
        Ok(true)
    }

    /// 记录一次Worker心跳
    ///
    /// 未注册Worker的心跳按良性竞态处理：可能刚被缩容移除。
    pub async fn report_heartbeat(
        &self,
        worker_id: &str,
        metrics: &WorkerMetrics,
    ) -> OrchestratorResult<()> {
        let mut worker = match self.worker_repository.get(worker_id).await? {
            Some(worker) => worker,
            None => {
                debug!("收到未注册Worker {} 的心跳，忽略", worker_id);
                return Ok(());
            }
        };

        worker.update_heartbeat(metrics);
        self.worker_repository.update(&worker).await
    }

    pub async fn get_worker_metrics(&self) -> OrchestratorResult<Vec<WorkerRecord>> {
        self.worker_repository.list().await
    }

    /// 集群健康快照，平均耗时排除尚无样本的Worker
    pub async fn get_cluster_health(&self) -> OrchestratorResult<ClusterHealth> {
        let workers = self.worker_repository.list().await?;
        let total_workers = workers.len();
        let active_workers = workers.iter().filter(|w| w.is_active()).count();
        let error_workers = workers
            .iter()
            .filter(|w| w.status == WorkerState::Error)
            .count();

        let samples: Vec<f64> = workers
            .iter()
            .map(|w| w.avg_processing_ms)
            .filter(|v| *v > 0.0)
            .collect();
        let avg_processing_ms = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<f64>() / samples.len() as f64
        };

        Ok(ClusterHealth {
            total_workers,
            active_workers,
            error_workers,
            is_healthy: error_workers == 0,
            avg_processing_ms,
        })
    }

    /// 健康检查循环：按固定间隔扫描心跳停滞的Worker
    pub async fn run_health_loop(&self) {
        info!("Worker健康检查循环启动");
        let interval = Duration::from_millis(self.cluster_config.health_check_interval_ms);

        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出健康检查循环");
                break;
            }

            if let Err(e) = self.check_worker_health().await {
                error!("Worker健康检查出错: {}", e);
            }

            tokio::time::sleep(interval).await;
        }
    }

    async fn check_worker_health(&self) -> OrchestratorResult<()> {
        let workers = self.worker_repository.list().await?;
        let now = Utc::now();
        let active_count = workers.iter().filter(|w| w.is_active()).count();
        self.metrics.update_active_workers(active_count as f64);

        for worker in &workers {
            if !worker.is_active() {
                continue;
            }
            let age_ms = worker.heartbeat_age_ms(now);
            if age_ms > self.heartbeat_stale_ms {
                warn!(
                    "Worker {} 心跳停滞 {}ms (阈值 {}ms)，移交恢复协调器",
                    worker.id, age_ms, self.heartbeat_stale_ms
                );
                let signal = WorkerFailureSignal {
                    worker_id: worker.id.clone(),
                    reason: format!("心跳停滞超过{}ms", self.heartbeat_stale_ms),
                };
                if let Err(e) = self.failure_tx.send(signal).await {
                    warn!("失联Worker信号发送失败: {}", e);
                }
            }
        }

        Ok(())
    }

    /// 伸缩评估循环
    pub async fn run_scale_loop(&self) {
        info!("集群伸缩评估循环启动");
        let interval = Duration::from_millis(self.cluster_config.scale_check_interval_ms);

        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出伸缩评估循环");
                break;
            }

            self.evaluate_scaling_once().await;

            tokio::time::sleep(interval).await;
        }
    }

    /// 执行一轮伸缩评估，每轮最多一个伸缩动作
    ///
    /// CAS护栏保证同一时刻只有一轮评估在跑，并发触发直接合并掉。
    pub async fn evaluate_scaling_once(&self) {
        if self
            .is_scaling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("已有伸缩评估在进行，跳过本轮");
            return;
        }

        if self.cooldown_active().await {
            debug!("伸缩动作冷却期内，跳过本轮");
        } else if self.evaluate_tiers().await {
            let mut last = self.last_scale_action.write().await;
            *last = Some(Utc::now());
        }

        self.is_scaling.store(false, Ordering::Release);
    }

    async fn cooldown_active(&self) -> bool {
        let last = self.last_scale_action.read().await;
        match *last {
            Some(at) => {
                (Utc::now() - at).num_milliseconds()
                    < self.cluster_config.scale_cooldown_ms as i64
            }
            None => false,
        }
    }

    async fn evaluate_tiers(&self) -> bool {
        let mut total_depth = 0u32;
        for tier in TierName::all() {
            let depth = match self.broker.depth(tier).await {
                Ok(depth) => depth,
                Err(e) => {
                    warn!("查询 {} 层队列深度失败，跳过该层评估: {}", tier, e);
                    continue;
                }
            };
            total_depth += depth;

            match self.assess_tier(tier, depth).await {
                Ok(Some(assessment)) => {
                    if self.apply_assessment(&assessment).await {
                        self.metrics.update_queue_depth(total_depth as f64);
                        return true;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{} 层伸缩评估失败: {}", tier, e),
            }
        }

        self.metrics.update_queue_depth(total_depth as f64);
        false
    }

    /// 单层级评估：人均待处理量对比扩缩阈值，推荐值收敛到min/max以内
    async fn assess_tier(
        &self,
        tier: TierName,
        depth: u32,
    ) -> OrchestratorResult<Option<TierScaleAssessment>> {
        let settings = self.tier_settings(tier);
        let workers = self.worker_repository.list_by_tier(tier).await?;
        let active: Vec<&WorkerRecord> = workers.iter().filter(|w| w.is_active()).collect();
        let busy = active.iter().filter(|w| w.is_busy()).count();

        if active.is_empty() {
            if settings.min_workers == 0 {
                return Ok(None);
            }
            // 层级被打空了，恢复到下限
            return Ok(Some(TierScaleAssessment {
                tier,
                waiting: depth,
                active_workers: 0,
                busy_workers: 0,
                recommended_workers: settings.min_workers,
            }));
        }

        let load = (depth as f64 + busy as f64) / active.len() as f64;
        let recommended = if load > self.cluster_config.scale_up_threshold {
            (active.len() + 1).min(settings.max_workers)
        } else if load < self.cluster_config.scale_down_threshold && busy < active.len() {
            active.len().saturating_sub(1).max(settings.min_workers)
        } else {
            active.len()
        };

        if recommended == active.len() {
            return Ok(None);
        }

        debug!(
            "{} 层伸缩评估: 等待={} 在岗={} 忙碌={} 人均负载={:.2} 推荐={}",
            tier,
            depth,
            active.len(),
            busy,
            load,
            recommended
        );

        Ok(Some(TierScaleAssessment {
            tier,
            waiting: depth,
            active_workers: active.len(),
            busy_workers: busy,
            recommended_workers: recommended,
        }))
    }

    async fn apply_assessment(&self, assessment: &TierScaleAssessment) -> bool {
        if assessment.recommended_workers > assessment.active_workers {
            let to_add = assessment.recommended_workers - assessment.active_workers;
            info!(
                "{} 层扩容 {} -> {} (等待作业: {})",
                assessment.tier,
                assessment.active_workers,
                assessment.recommended_workers,
                assessment.waiting
            );

            let mut added = 0;
            for _ in 0..to_add {
                match self.create_worker(assessment.tier).await {
                    Ok(_) => added += 1,
                    Err(e) => {
                        warn!("{} 层扩容失败: {}", assessment.tier, e);
                        break;
                    }
                }
            }
            if added > 0 {
                self.metrics.record_scale_operation("up", added);
            }
            added > 0
        } else {
            let to_remove = assessment.active_workers - assessment.recommended_workers;
            info!(
                "{} 层缩容 {} -> {}",
                assessment.tier, assessment.active_workers, assessment.recommended_workers
            );

            let idle_ids: Vec<String> = match self
                .worker_repository
                .list_by_tier(assessment.tier)
                .await
            {
                Ok(workers) => workers
                    .iter()
                    .filter(|w| w.is_available())
                    .take(to_remove)
                    .map(|w| w.id.clone())
                    .collect(),
                Err(e) => {
                    warn!("{} 层缩容前查询Worker失败: {}", assessment.tier, e);
                    return false;
                }
            };

            let mut removed = 0;
            for worker_id in idle_ids {
                match self.stop_worker(&worker_id).await {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => warn!("缩容停止Worker {} 失败: {}", worker_id, e),
                }
            }
            if removed > 0 {
                self.metrics.record_scale_operation("down", removed);
            }
            removed > 0
        }
    }

    async fn ensure_min_workers(&self) {
        for tier in TierName::all() {
            let settings = self.tier_settings(tier);
            let active = match self.worker_repository.list_by_tier(tier).await {
                Ok(workers) => workers.iter().filter(|w| w.is_active()).count(),
                Err(e) => {
                    warn!("查询 {} 层Worker失败，跳过补足: {}", tier, e);
                    continue;
                }
            };

            for _ in active..settings.min_workers {
                if let Err(e) = self.create_worker(tier).await {
                    warn!("补足 {} 层最低Worker数失败: {}", tier, e);
                    break;
                }
            }
        }
    }

    /// 命令消费循环：执行负载均衡器与恢复协调器请求的集群动作
    pub async fn run_command_loop(&self) {
        let mut rx = match self.command_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("集群命令通道已被其他任务占用");
                return;
            }
        };

        info!("集群命令循环启动");
        while let Some(command) = rx.recv().await {
            if !*self.running.read().await {
                break;
            }
            match command {
                ClusterCommand::SpawnWorker { tier } => {
                    if let Err(e) = self.create_worker(tier).await {
                        warn!("按请求创建 {} 层Worker失败: {}", tier, e);
                    }
                }
                ClusterCommand::StopWorker { worker_id } => {
                    if let Err(e) = self.stop_worker(&worker_id).await {
                        warn!("按请求停止Worker {} 失败: {}", worker_id, e);
                    }
                }
            }
        }
        info!("集群命令循环退出");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_domain::{Job, JobMessage};

    use crate::test_utils::mocks::{
        test_config, JobBuilder, MockQueueBroker, MockWorkerLauncher, MockWorkerRepository,
        WorkerRecordBuilder,
    };

    struct Harness {
        manager: ClusterManager,
        launcher: Arc<MockWorkerLauncher>,
        repo: Arc<MockWorkerRepository>,
        broker: Arc<MockQueueBroker>,
        failure_rx: mpsc::Receiver<WorkerFailureSignal>,
        command_tx: mpsc::Sender<ClusterCommand>,
    }

    fn make_harness(workers: Vec<WorkerRecord>) -> Harness {
        let launcher = Arc::new(MockWorkerLauncher::new());
        let repo = Arc::new(MockWorkerRepository::with_workers(workers));
        let broker = Arc::new(MockQueueBroker::new());
        let (failure_tx, failure_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(16);

        let config = test_config();

        let manager = ClusterManager::new(
            &config,
            launcher.clone(),
            repo.clone(),
            broker.clone(),
            Arc::new(MetricsCollector::new()),
            failure_tx,
            command_rx,
        );

        Harness {
            manager,
            launcher,
            repo,
            broker,
            failure_rx,
            command_tx,
        }
    }

    fn idle_worker(id: &str, tier: TierName) -> WorkerRecord {
        WorkerRecordBuilder::new(id).with_tier(tier).build()
    }

    async fn fill_queue(broker: &MockQueueBroker, tier: TierName, count: usize) {
        for i in 0..count {
            let job: Job = JobBuilder::new(&format!("fill-{tier}-{i}"))
                .with_tier(tier)
                .build();
            let message = JobMessage::from_job(&job);
            broker.enqueue(tier, &message, job.priority).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_worker_registers_record() {
        let harness = make_harness(vec![]);

        let worker_id = harness
            .manager
            .create_worker(TierName::Premium)
            .await
            .unwrap();

        assert_eq!(harness.launcher.spawned_tiers(), vec![TierName::Premium]);
        let record = harness.repo.get(&worker_id).await.unwrap().unwrap();
        assert_eq!(record.tier, TierName::Premium);
        assert_eq!(record.status, WorkerState::Starting);
        assert_eq!(record.hostname, "test-host");
    }

    #[tokio::test]
    async fn test_stop_worker_refuses_busy_worker() {
        let busy = WorkerRecordBuilder::new("worker-1")
            .with_current_job("job-1")
            .build();
        let harness = make_harness(vec![busy]);

        let stopped = harness.manager.stop_worker("worker-1").await.unwrap();
        assert!(!stopped);
        assert_eq!(harness.repo.count(), 1);
        assert!(harness.launcher.stopped_ids().is_empty());
    }

    #[tokio::test]
    async fn test_stop_worker_removes_idle_worker() {
        let harness = make_harness(vec![idle_worker("worker-1", TierName::Normal)]);

        let stopped = harness.manager.stop_worker("worker-1").await.unwrap();
        assert!(stopped);
        assert_eq!(harness.repo.count(), 0);
        assert_eq!(harness.launcher.stopped_ids(), vec!["worker-1"]);
    }

    #[tokio::test]
    async fn test_report_heartbeat_updates_record() {
        let harness = make_harness(vec![idle_worker("worker-1", TierName::Normal)]);

        let metrics = WorkerMetrics {
            worker_id: "worker-1".to_string(),
            current_job_id: Some("job-7".to_string()),
            avg_processing_ms: 4_200.0,
            jobs_completed_total: 3,
            timestamp: Utc::now(),
        };
        harness
            .manager
            .report_heartbeat("worker-1", &metrics)
            .await
            .unwrap();

        let record = harness.repo.get("worker-1").await.unwrap().unwrap();
        assert_eq!(record.current_job_id.as_deref(), Some("job-7"));
        assert_eq!(record.status, WorkerState::Processing);
        assert_eq!(record.avg_processing_ms, 4_200.0);
    }

    #[tokio::test]
    async fn test_heartbeat_from_unknown_worker_is_benign() {
        let harness = make_harness(vec![]);

        let metrics = WorkerMetrics {
            worker_id: "ghost".to_string(),
            current_job_id: None,
            avg_processing_ms: 0.0,
            jobs_completed_total: 0,
            timestamp: Utc::now(),
        };
        assert!(harness
            .manager
            .report_heartbeat("ghost", &metrics)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cluster_health_excludes_zero_samples() {
        let harness = make_harness(vec![
            WorkerRecordBuilder::new("worker-1")
                .with_avg_processing_ms(5_000.0)
                .build(),
            WorkerRecordBuilder::new("worker-2")
                .with_avg_processing_ms(10_000.0)
                .build(),
            WorkerRecordBuilder::new("worker-3").build(),
        ]);

        let health = harness.manager.get_cluster_health().await.unwrap();
        assert_eq!(health.total_workers, 3);
        assert_eq!(health.active_workers, 3);
        assert_eq!(health.error_workers, 0);
        assert!(health.is_healthy);
        // 尚无样本的worker-3不参与平均
        assert_eq!(health.avg_processing_ms, 7_500.0);
    }

    #[tokio::test]
    async fn test_cluster_health_unhealthy_with_error_worker() {
        let harness = make_harness(vec![
            idle_worker("worker-1", TierName::Normal),
            WorkerRecordBuilder::new("worker-2")
                .with_status(WorkerState::Error)
                .build(),
        ]);

        let health = harness.manager.get_cluster_health().await.unwrap();
        assert_eq!(health.error_workers, 1);
        assert!(!health.is_healthy);
    }

    #[tokio::test]
    async fn test_health_check_flags_stale_workers() {
        let mut harness = make_harness(vec![
            WorkerRecordBuilder::new("worker-stale")
                .with_current_job("job-1")
                .heartbeat_ms_ago(120_000)
                .build(),
            WorkerRecordBuilder::new("worker-fresh").build(),
            // 已是ERROR的不再重复上报
            WorkerRecordBuilder::new("worker-dead")
                .with_status(WorkerState::Error)
                .heartbeat_ms_ago(300_000)
                .build(),
        ]);

        harness.manager.check_worker_health().await.unwrap();

        let signal = harness.failure_rx.try_recv().unwrap();
        assert_eq!(signal.worker_id, "worker-stale");
        assert!(harness.failure_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scaling_adds_worker_under_load() {
        let harness = make_harness(vec![
            idle_worker("worker-p", TierName::Premium),
            idle_worker("worker-n", TierName::Normal),
            idle_worker("worker-l", TierName::Large),
        ]);
        fill_queue(&harness.broker, TierName::Normal, 10).await;

        harness.manager.evaluate_scaling_once().await;

        assert_eq!(harness.launcher.spawn_count(), 1);
        assert_eq!(harness.launcher.spawned_tiers(), vec![TierName::Normal]);
        assert_eq!(harness.repo.count(), 4);
    }

    #[tokio::test]
    async fn test_scaling_respects_max_workers() {
        // large层max_workers=2，已到上限
        let harness = make_harness(vec![
            idle_worker("worker-p", TierName::Premium),
            idle_worker("worker-n", TierName::Normal),
            idle_worker("worker-l1", TierName::Large),
            idle_worker("worker-l2", TierName::Large),
        ]);
        fill_queue(&harness.broker, TierName::Large, 20).await;

        harness.manager.evaluate_scaling_once().await;

        assert_eq!(harness.launcher.spawn_count(), 0);
        assert_eq!(harness.repo.count(), 4);
    }

    #[tokio::test]
    async fn test_scaling_down_stops_only_idle_workers() {
        let busy = WorkerRecordBuilder::new("worker-busy")
            .with_tier(TierName::Normal)
            .with_current_job("job-1")
            .build();
        let harness = make_harness(vec![
            idle_worker("worker-p", TierName::Premium),
            idle_worker("worker-l", TierName::Large),
            busy,
            idle_worker("worker-idle", TierName::Normal),
        ]);

        harness.manager.evaluate_scaling_once().await;

        assert_eq!(harness.launcher.stopped_ids(), vec!["worker-idle"]);
        assert!(harness.repo.get("worker-busy").await.unwrap().is_some());
        assert_eq!(harness.repo.count(), 3);
    }

    #[tokio::test]
    async fn test_scaling_cooldown_coalesces_actions() {
        let harness = make_harness(vec![
            idle_worker("worker-p", TierName::Premium),
            idle_worker("worker-n", TierName::Normal),
            idle_worker("worker-l", TierName::Large),
        ]);
        fill_queue(&harness.broker, TierName::Normal, 10).await;

        harness.manager.evaluate_scaling_once().await;
        harness.manager.evaluate_scaling_once().await;

        // 第二轮落在冷却期内
        assert_eq!(harness.launcher.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_start_ensures_min_workers() {
        let harness = make_harness(vec![]);

        harness.manager.start().await.unwrap();

        // 每层默认min_workers=1
        assert_eq!(harness.launcher.spawn_count(), 3);
        assert_eq!(harness.repo.count(), 3);
        harness.manager.stop().await;
    }

    #[tokio::test]
    async fn test_command_loop_executes_spawn_requests() {
        let harness = make_harness(vec![]);
        harness.manager.start().await.unwrap();
        let spawned_at_start = harness.launcher.spawn_count();

        harness
            .command_tx
            .send(ClusterCommand::SpawnWorker {
                tier: TierName::Large,
            })
            .await
            .unwrap();
        drop(harness.command_tx);

        harness.manager.run_command_loop().await;

        assert_eq!(harness.launcher.spawn_count(), spawned_at_start + 1);
        assert!(harness
            .launcher
            .spawned_tiers()
            .contains(&TierName::Large));
    }
}
