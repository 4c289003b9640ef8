//! 故障恢复协调器
//!
//! 作业与Worker状态的最终裁判：登记作业归属、消费心跳、
//! 处置失联Worker、周期性清扫失속作业并按指数退避重试。
//!
//! Worker故障只做"隔离标记"：名下作业全部转入RECOVERY_PENDING，
//! 重试调度与终判失败统一由清扫循环完成，保证同一作业不会被
//! 两条路径同时搬动。每次隔离追加一条FailureRecord，恢复结果
//! （成功完成或终判失败）回写且只回写一次。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use docflow_core::{CircuitBreaker, CircuitState, RecoveryConfig};
use docflow_domain::{
    Alert, AlertType, AuditStore, FailureRecord, Job, JobEvent, JobRepository, JobStatus,
    NotificationSink, OrchestratorResult, StaleJobQuery, WorkerMetrics, WorkerRepository,
    WorkerState,
};
use docflow_infrastructure::MetricsCollector;

use crate::cluster::{ClusterCommand, WorkerFailureSignal};
use crate::queue_manager::PriorityQueueManager;

/// 恢复域的运行統計
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStats {
    pub recovery_pending: usize,
    pub retrying: usize,
    pub permanently_failed: usize,
    /// 已安排重试、尚未知道结局的作业数
    pub awaiting_outcome: usize,
}

/// 健康巡检结论
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryHealthReport {
    pub job_store_reachable: bool,
    pub worker_store_reachable: bool,
    pub open_breakers: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

pub struct FailureRecoveryCoordinator {
    job_repository: Arc<dyn JobRepository>,
    worker_repository: Arc<dyn WorkerRepository>,
    audit_store: Arc<dyn AuditStore>,
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<MetricsCollector>,
    queue_manager: Arc<PriorityQueueManager>,
    cluster_tx: mpsc::Sender<ClusterCommand>,
    failure_rx: Mutex<Option<mpsc::Receiver<WorkerFailureSignal>>>,
    config: RecoveryConfig,
    /// job_id -> 最近一条待回写结果的FailureRecord id
    pending_recoveries: Mutex<HashMap<String, String>>,
    breakers: RwLock<Vec<Arc<CircuitBreaker>>>,
    /// 上次巡检观察到的熔断器状态，用于只在翻转瞬间告警
    breaker_states: Mutex<HashMap<String, CircuitState>>,
    running: RwLock<bool>,
}

impl FailureRecoveryCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        worker_repository: Arc<dyn WorkerRepository>,
        audit_store: Arc<dyn AuditStore>,
        sink: Arc<dyn NotificationSink>,
        metrics: Arc<MetricsCollector>,
        queue_manager: Arc<PriorityQueueManager>,
        cluster_tx: mpsc::Sender<ClusterCommand>,
        failure_rx: mpsc::Receiver<WorkerFailureSignal>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            job_repository,
            worker_repository,
            audit_store,
            sink,
            metrics,
            queue_manager,
            cluster_tx,
            failure_rx: Mutex::new(Some(failure_rx)),
            config,
            pending_recoveries: Mutex::new(HashMap::new()),
            breakers: RwLock::new(Vec::new()),
            breaker_states: Mutex::new(HashMap::new()),
            running: RwLock::new(false),
        }
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        *running = true;
        info!("故障恢复协调器启动");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("故障恢复协调器停止");
    }

    /// 登记熔断器，健康巡检时观察其状态翻转
    pub async fn register_breaker(&self, breaker: Arc<CircuitBreaker>) {
        let mut breakers = self.breakers.write().await;
        breakers.push(breaker);
    }

    /// Worker租到消息：登记归属，进入开始执行前的过渡状态
    ///
    /// 租约时刻记一次作业心跳，停滞在DISPATCHED的作业据此被清扫发现。
    pub async fn mark_job_dispatched(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> OrchestratorResult<()> {
        let mut job = match self.job_repository.get(job_id).await? {
            Some(job) => job,
            None => {
                warn!("租出的作业 {} 不在存储中", job_id);
                return Ok(());
            }
        };
        if job.is_terminal() {
            return Ok(());
        }

        job.worker_id = Some(worker_id.to_string());
        job.update_status(JobStatus::Dispatched);
        job.touch_heartbeat(Utc::now());
        self.job_repository.update(&job).await?;

        debug!("作业 {} 已租给Worker {}", job_id, worker_id);
        Ok(())
    }

    /// 作业开始执行：登记作业与Worker的归属关系
    pub async fn register_job(&self, job_id: &str, worker_id: &str) -> OrchestratorResult<()> {
        let mut job = match self.job_repository.get(job_id).await? {
            Some(job) => job,
            None => {
                warn!("开始执行的作业 {} 不在存储中", job_id);
                return Ok(());
            }
        };
        if job.is_terminal() {
            debug!("作业 {} 已达终态，忽略迟到的开始信号", job_id);
            return Ok(());
        }

        job.worker_id = Some(worker_id.to_string());
        job.update_status(JobStatus::Processing);
        job.touch_heartbeat(Utc::now());
        self.job_repository.update(&job).await?;

        if let Some(mut worker) = self.worker_repository.get(worker_id).await? {
            worker.assign_job(job_id);
            self.worker_repository.update(&worker).await?;
        }

        self.publish_event(JobEvent::started(job_id, worker_id)).await;
        debug!("作业 {} 开始由Worker {} 处理", job_id, worker_id);
        Ok(())
    }

    /// 作业进度上报，顺带当作一次心跳
    pub async fn update_job_progress(&self, job_id: &str, percent: u8) -> OrchestratorResult<()> {
        let mut job = match self.job_repository.get(job_id).await? {
            Some(job) => job,
            None => return Ok(()),
        };
        if job.is_terminal() {
            return Ok(());
        }

        job.progress_percent = percent.min(100);
        job.touch_heartbeat(Utc::now());
        self.job_repository.update(&job).await?;

        self.publish_event(JobEvent::progress(job_id, percent.min(100)))
            .await;
        Ok(())
    }

    /// Worker心跳的作业侧处理：刷新其在手作业的心跳时间
    ///
    /// Worker记录本身由集群管理器维护，这里只关心作业失联判定
    /// 所依赖的`last_heartbeat_at`。
    pub async fn record_worker_heartbeat(
        &self,
        _worker_id: &str,
        metrics: &WorkerMetrics,
    ) -> OrchestratorResult<()> {
        let Some(job_id) = metrics.current_job_id.as_deref() else {
            return Ok(());
        };

        let mut job = match self.job_repository.get(job_id).await? {
            Some(job) => job,
            None => return Ok(()),
        };
        if job.is_terminal() {
            return Ok(());
        }

        job.touch_heartbeat(metrics.timestamp);
        self.job_repository.update(&job).await
    }

    /// 作业成功完成
    ///
    /// 幂等；作业不存在按良性竞态处理，完成与恢复可能赛跑，
    /// 先到者有效。
    pub async fn mark_job_completed(
        &self,
        job_id: &str,
        worker_id: &str,
        processing_ms: u64,
    ) -> OrchestratorResult<()> {
        let mut job = match self.job_repository.get(job_id).await? {
            Some(job) => job,
            None => {
                debug!("完成信号晚于作业 {} 的清理，忽略", job_id);
                return Ok(());
            }
        };
        if job.is_terminal() {
            debug!("作业 {} 已达终态 {}，重复完成信号忽略", job_id, job.status);
            return Ok(());
        }

        let now = Utc::now();
        job.progress_percent = 100;
        job.update_status(JobStatus::Completed);
        self.job_repository.update(&job).await?;

        if let Some(mut worker) = self.worker_repository.get(worker_id).await? {
            worker.record_completion(processing_ms, now);
            self.worker_repository.update(&worker).await?;
        }

        self.resolve_pending(job_id, true, now).await;
        self.publish_event(JobEvent::completed(job_id, worker_id, processing_ms))
            .await;
        self.metrics
            .record_job_completed(job.tier.as_str(), processing_ms as f64 / 1000.0);

        info!("作业 {} 完成，耗时 {}ms", job_id, processing_ms);
        Ok(())
    }

    /// 单个作业执行失败（Worker本身存活）
    ///
    /// 未耗尽重试则直接安排退避重试，不经过RECOVERY_PENDING；
    /// 耗尽则终判失败。
    pub async fn handle_job_failure(
        &self,
        job_id: &str,
        worker_id: &str,
        reason: &str,
    ) -> OrchestratorResult<()> {
        let mut job = match self.job_repository.get(job_id).await? {
            Some(job) => job,
            None => {
                debug!("失败信号晚于作业 {} 的清理，忽略", job_id);
                return Ok(());
            }
        };
        if job.is_terminal() {
            return Ok(());
        }

        let now = Utc::now();

        // Worker仍然存活：记下错误时间并释放在手作业，不进ERROR状态
        if let Some(mut worker) = self.worker_repository.get(worker_id).await? {
            worker.last_error_at = Some(now);
            worker.clear_assignment();
            self.worker_repository.update(&worker).await?;
        }

        let record = FailureRecord::new(job_id, Some(worker_id.to_string()), reason, job.retry_count);
        if let Err(e) = self.audit_store.record_failure(&record).await {
            warn!("作业 {} 的故障记录写入失败: {}", job_id, e);
        }

        if job.can_retry(self.config.max_retries) {
            self.track_pending(job_id, &record.id).await;
            self.schedule_retry(&mut job, reason, now).await?;
            self.publish_event(JobEvent::failed(job_id, reason, true)).await;
        } else {
            self.fail_terminally(&mut job, reason, now).await?;
        }
        Ok(())
    }

    /// 处置失联Worker
    ///
    /// 标记Worker故障，名下所有未完结作业转入RECOVERY_PENDING并各记
    /// 一条FailureRecord，整个事件发一条critical告警，最后请求替补。
    /// 重试调度留给清扫循环。对已非在岗状态的Worker重复调用是空操作。
    pub async fn handle_worker_failure(
        &self,
        worker_id: &str,
        reason: &str,
    ) -> OrchestratorResult<()> {
        let mut worker = match self.worker_repository.get(worker_id).await? {
            Some(worker) => worker,
            None => {
                warn!("故障Worker {} 不在注册表中", worker_id);
                return Ok(());
            }
        };
        if !worker.is_active() {
            debug!(
                "Worker {} 已处于 {} 状态，跳过重复处置",
                worker_id, worker.status
            );
            return Ok(());
        }

        let now = Utc::now();
        warn!("开始处置故障Worker {}: {}", worker_id, reason);

        worker.record_error(now);
        worker.current_job_id = None;
        self.worker_repository.update(&worker).await?;

        let owned: Vec<Job> = self
            .job_repository
            .list_by_worker(worker_id)
            .await?
            .into_iter()
            .filter(|job| !job.is_terminal())
            .collect();

        let mut affected = Vec::new();
        for mut job in owned {
            match self
                .quarantine_job(&mut job, Some(worker_id), reason, now)
                .await
            {
                Ok(()) => affected.push(job.id.clone()),
                Err(e) => warn!("作业 {} 转入恢复队列失败: {}", job.id, e),
            }
        }

        let alert = Alert::critical(
            AlertType::WorkerFailure,
            format!("Worker {worker_id} 故障: {reason}"),
            json!({
                "worker_id": worker_id,
                "tier": worker.tier.as_str(),
                "affected_jobs": affected,
            }),
        );
        self.publish_alert(&alert).await;

        // 隔离完成，进入等待回收状态，并请求同层替补
        worker.status = WorkerState::Recovering;
        self.worker_repository.update(&worker).await?;

        if let Err(e) = self
            .cluster_tx
            .send(ClusterCommand::SpawnWorker { tier: worker.tier })
            .await
        {
            warn!("替补Worker请求发送失败: {}", e);
        }

        info!(
            "Worker {} 处置完成，{} 个作业转入恢复流程",
            worker_id,
            affected.len()
        );
        Ok(())
    }

    /// 失联作业清扫循环
    pub async fn run_sweep_loop(&self) {
        info!("恢复清扫循环启动");
        let interval = StdDuration::from_millis(self.config.sweep_interval_ms);

        loop {
            if !*self.running.read().await {
                info!("收到停止信号，退出恢复清扫循环");
                break;
            }

            if let Err(e) = self.sweep_once().await {
                error!("恢复清扫出错: {}", e);
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Worker故障信号消费循环，信号来自集群健康检查
    pub async fn run_failure_signal_loop(&self) {
        let mut rx = match self.failure_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("Worker故障信号通道已被其他任务占用");
                return;
            }
        };

        info!("Worker故障信号循环启动");
        while let Some(signal) = rx.recv().await {
            if let Err(e) = self
                .handle_worker_failure(&signal.worker_id, &signal.reason)
                .await
            {
                error!("处置失联Worker {} 失败: {}", signal.worker_id, e);
            }
        }
        info!("Worker故障信号循环退出");
    }

    /// 执行一轮清扫，返回处理的候选数
    ///
    /// 候选按状态优先级、重试次数、入队时间排序：已在恢复流程中的
    /// 作业先于新失联的，低重试次数的不被高重试次数的饿死。
    pub async fn sweep_once(&self) -> OrchestratorResult<usize> {
        let now = Utc::now();
        let query = StaleJobQuery {
            now,
            heartbeat_stale_ms: self.config.heartbeat_stale_ms as i64,
            bootstrap_heartbeat_ms: self.config.bootstrap_heartbeat_ms as i64,
            max_queued_wait_ms: self.config.max_queued_wait_ms as i64,
        };

        let mut candidates = self.job_repository.query_stale(&query).await?;
        candidates.sort_by(|a, b| {
            a.status
                .recovery_rank()
                .cmp(&b.status.recovery_rank())
                .then(a.retry_count.cmp(&b.retry_count))
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        });

        self.metrics.record_recovery_sweep(candidates.len());
        if !candidates.is_empty() {
            info!("本轮清扫发现 {} 个恢复候选", candidates.len());
        }

        let mut processed = 0;
        for mut job in candidates {
            match self.recover_job(&mut job, now).await {
                Ok(()) => processed += 1,
                Err(e) => warn!("作业 {} 恢复处理失败: {}", job.id, e),
            }
        }

        self.cleanup_recovering_workers().await;
        Ok(processed)
    }

    async fn recover_job(&self, job: &mut Job, now: DateTime<Utc>) -> OrchestratorResult<()> {
        match job.status {
            JobStatus::Queued => {
                // 排队超时：消息多半仍压在队列里，先撤下再接管
                if let Err(e) = self.queue_manager.withdraw(&job.id).await {
                    warn!("撤下作业 {} 的队列消息失败: {}", job.id, e);
                }
                self.quarantine_job(job, None, "排队等待超时", now).await?;
                self.schedule_or_fail(job, "排队等待超时", now).await
            }
            JobStatus::Dispatched | JobStatus::Processing => {
                let worker_id = job.worker_id.clone();
                self.quarantine_job(job, worker_id.as_deref(), "处理心跳停滞", now)
                    .await?;

                let alert = Alert::warning(
                    AlertType::JobTimeout,
                    format!("作业 {} 处理心跳停滞", job.id),
                    json!({
                        "job_id": job.id,
                        "worker_id": worker_id,
                        "retry_count": job.retry_count,
                    }),
                );
                self.publish_alert(&alert).await;

                self.schedule_or_fail(job, "处理心跳停滞", now).await
            }
            JobStatus::RecoveryPending => {
                let reason = job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "等待恢复".to_string());
                self.schedule_or_fail(job, &reason, now).await
            }
            JobStatus::Retrying => self.requeue_retrying(job, now).await,
            _ => {
                debug!("作业 {} 状态 {} 无需清扫动作", job.id, job.status);
                Ok(())
            }
        }
    }

    /// 把作业隔离进RECOVERY_PENDING并追加故障记录
    async fn quarantine_job(
        &self,
        job: &mut Job,
        worker_id: Option<&str>,
        reason: &str,
        _now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        job.update_status(JobStatus::RecoveryPending);
        job.worker_id = None;
        job.error_message = Some(reason.to_string());
        self.job_repository.update(job).await?;

        let record = FailureRecord::new(
            &job.id,
            worker_id.map(|id| id.to_string()),
            reason,
            job.retry_count,
        );
        self.audit_store.record_failure(&record).await?;
        self.track_pending(&job.id, &record.id).await;

        debug!("作业 {} 转入恢复队列: {}", job.id, reason);
        Ok(())
    }

    /// 还有重试额度则安排退避重试，耗尽则终判失败
    async fn schedule_or_fail(
        &self,
        job: &mut Job,
        reason: &str,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        if job.can_retry(self.config.max_retries) {
            self.schedule_retry(job, reason, now).await
        } else {
            self.fail_terminally(job, reason, now).await
        }
    }

    async fn schedule_retry(
        &self,
        job: &mut Job,
        reason: &str,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        let delay_ms = self.backoff_delay_ms(job.retry_count);
        job.retry_count += 1;
        job.update_status(JobStatus::Retrying);
        job.next_attempt_at = Some(now + Duration::milliseconds(delay_ms));
        job.worker_id = None;
        job.error_message = Some(reason.to_string());
        self.job_repository.update(job).await?;

        self.metrics.record_job_retry(&job.id, job.retry_count);
        info!(
            "作业 {} 安排第 {} 次重试，{}ms 后生效",
            job.id, job.retry_count, delay_ms
        );
        Ok(())
    }

    /// 到期的RETRYING作业重新入队，保留原层级与优先级
    async fn requeue_retrying(&self, job: &mut Job, now: DateTime<Utc>) -> OrchestratorResult<()> {
        job.update_status(JobStatus::Queued);
        job.next_attempt_at = None;
        job.worker_id = None;
        job.progress_percent = 0;
        job.enqueued_at = now;
        self.job_repository.update(job).await?;

        let position = self.queue_manager.resubmit(job).await?;
        info!(
            "作业 {} 第 {} 次重试入队，排位 {}",
            job.id, job.retry_count, position
        );
        Ok(())
    }

    /// 重试额度耗尽，终判失败并发独立告警
    async fn fail_terminally(
        &self,
        job: &mut Job,
        reason: &str,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        job.update_status(JobStatus::Failed);
        job.worker_id = None;
        job.error_message = Some(format!("重试{}次后放弃: {}", job.retry_count, reason));
        self.job_repository.update(job).await?;

        self.resolve_pending(&job.id, false, now).await;

        let alert = Alert::critical(
            AlertType::JobFailed,
            format!("作业 {} 重试{}次后永久失败", job.id, job.retry_count),
            json!({
                "job_id": job.id,
                "tier": job.tier.as_str(),
                "retry_count": job.retry_count,
                "reason": reason,
            }),
        );
        self.publish_alert(&alert).await;
        self.publish_event(JobEvent::failed(&job.id, reason, false))
            .await;
        self.metrics
            .record_job_failed(job.tier.as_str(), "retries_exhausted");

        warn!("作业 {} 永久失败: {}", job.id, reason);
        Ok(())
    }

    /// 回收已无在手作业的RECOVERING Worker
    async fn cleanup_recovering_workers(&self) {
        let workers = match self.worker_repository.list().await {
            Ok(workers) => workers,
            Err(e) => {
                warn!("查询Worker列表失败，跳过回收: {}", e);
                return;
            }
        };

        for worker in workers {
            if worker.status != WorkerState::Recovering {
                continue;
            }
            let owned = match self.job_repository.list_by_worker(&worker.id).await {
                Ok(jobs) => jobs.into_iter().filter(|j| !j.is_terminal()).count(),
                Err(e) => {
                    warn!("查询Worker {} 名下作业失败: {}", worker.id, e);
                    continue;
                }
            };
            if owned == 0 {
                match self.worker_repository.remove(&worker.id).await {
                    Ok(_) => info!("已回收完成善后的Worker {}", worker.id),
                    Err(e) => warn!("回收Worker {} 失败: {}", worker.id, e),
                }
            }
        }
    }

    pub async fn get_recovery_stats(&self) -> OrchestratorResult<RecoveryStats> {
        let recovery_pending = self
            .job_repository
            .list_by_status(JobStatus::RecoveryPending)
            .await?
            .len();
        let retrying = self
            .job_repository
            .list_by_status(JobStatus::Retrying)
            .await?
            .len();
        let permanently_failed = self
            .job_repository
            .list_by_status(JobStatus::Failed)
            .await?
            .len();
        let awaiting_outcome = self.pending_recoveries.lock().await.len();

        Ok(RecoveryStats {
            recovery_pending,
            retrying,
            permanently_failed,
            awaiting_outcome,
        })
    }

    /// 健康巡检：存储可达性加熔断器状态观察
    ///
    /// 熔断器只在CLOSED/HALF_OPEN翻转到OPEN的瞬间告警一次，
    /// 持续OPEN不重复刷告警。
    pub async fn health_check(&self) -> OrchestratorResult<RecoveryHealthReport> {
        let job_store_reachable = self.job_repository.list_active().await.is_ok();
        let worker_store_reachable = self.worker_repository.list().await.is_ok();

        let breakers = self.breakers.read().await.clone();
        let mut open_breakers = Vec::new();
        {
            let mut states = self.breaker_states.lock().await;
            for breaker in &breakers {
                let state = breaker.get_state().await;
                let previous = states.insert(breaker.service_name().to_string(), state);

                if state == CircuitState::Open {
                    open_breakers.push(breaker.service_name().to_string());
                    if previous != Some(CircuitState::Open) {
                        let alert = Alert::critical(
                            AlertType::CircuitBreakerOpen,
                            format!("依赖 {} 的熔断器打开", breaker.service_name()),
                            json!({ "service": breaker.service_name() }),
                        );
                        self.publish_alert(&alert).await;
                    }
                }
            }
        }

        Ok(RecoveryHealthReport {
            job_store_reachable,
            worker_store_reachable,
            open_breakers,
            checked_at: Utc::now(),
        })
    }

    /// 指数退避加抖动，抖动幅度为±jitter_factor
    fn backoff_delay_ms(&self, retry_count: u32) -> i64 {
        let base = self.config.backoff_base_ms as f64;
        let capped = (base * 2f64.powi(retry_count as i32)).min(self.config.backoff_max_ms as f64);
        let jitter = capped * self.config.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        (capped + jitter).max(0.0) as i64
    }

    /// 登记待回写的恢复记录；同作业的旧记录按未恢复回写
    async fn track_pending(&self, job_id: &str, record_id: &str) {
        let mut pending = self.pending_recoveries.lock().await;
        if let Some(old_record_id) = pending.insert(job_id.to_string(), record_id.to_string()) {
            if let Err(e) = self
                .audit_store
                .record_recovery_outcome(&old_record_id, false, Utc::now())
                .await
            {
                warn!("作业 {} 旧恢复记录回写失败: {}", job_id, e);
            }
        }
    }

    async fn resolve_pending(&self, job_id: &str, succeeded: bool, at: DateTime<Utc>) {
        let record_id = {
            let mut pending = self.pending_recoveries.lock().await;
            pending.remove(job_id)
        };
        let Some(record_id) = record_id else {
            return;
        };

        if let Err(e) = self
            .audit_store
            .record_recovery_outcome(&record_id, succeeded, at)
            .await
        {
            warn!("作业 {} 恢复结果回写失败: {}", job_id, e);
        }
        if succeeded {
            self.metrics.record_job_recovered(job_id);
        }
    }

    async fn publish_event(&self, event: JobEvent) {
        if let Err(e) = self.sink.publish_job_event(&event).await {
            warn!("作业事件发布失败: {}", e);
        }
    }

    async fn publish_alert(&self, alert: &Alert) {
        if let Err(e) = self.audit_store.record_alert(alert).await {
            warn!("告警落库失败: {}", e);
        }
        if let Err(e) = self.sink.publish_alert(alert).await {
            warn!("告警发布失败: {}", e);
        }
    }
}
