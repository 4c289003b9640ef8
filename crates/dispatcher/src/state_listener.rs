//! Worker事件监听
//!
//! 所有Worker运行时事件的单一串行消费者。事件按到达顺序应用，
//! 心跳交给集群管理器与恢复协调器，生命周期事件先过状态转换
//! 校验再委派给协调器。非法转换（乱序或迟到的事件）告警后忽略，
//! 不算错误。

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use docflow_domain::{JobRepository, JobStatus, OrchestratorResult, WorkerEvent};

use crate::cluster::ClusterManager;
use crate::recovery::FailureRecoveryCoordinator;

pub struct StateListener {
    coordinator: Arc<FailureRecoveryCoordinator>,
    cluster: Arc<ClusterManager>,
    job_repository: Arc<dyn JobRepository>,
    event_rx: Mutex<Option<mpsc::Receiver<WorkerEvent>>>,
    running: RwLock<bool>,
}

impl StateListener {
    pub fn new(
        coordinator: Arc<FailureRecoveryCoordinator>,
        cluster: Arc<ClusterManager>,
        job_repository: Arc<dyn JobRepository>,
        event_rx: mpsc::Receiver<WorkerEvent>,
    ) -> Self {
        Self {
            coordinator,
            cluster,
            job_repository,
            event_rx: Mutex::new(Some(event_rx)),
            running: RwLock::new(false),
        }
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("状态监听器停止信号已发送");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 消费事件直到通道关闭或收到停止信号
    ///
    /// 单个事件处理失败只记日志，消费循环继续。
    pub async fn run(&self) {
        let mut rx = match self.event_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("Worker事件通道已被其他任务占用");
                return;
            }
        };

        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!("Worker事件监听启动");

        while let Some(event) = rx.recv().await {
            if !*self.running.read().await {
                info!("收到停止信号，退出Worker事件监听");
                break;
            }
            if let Err(e) = self.apply(&event).await {
                error!("处理Worker {} 的事件出错: {}", event.worker_id(), e);
            }
        }

        info!("Worker事件监听退出");
    }

    async fn apply(&self, event: &WorkerEvent) -> OrchestratorResult<()> {
        match event {
            WorkerEvent::Heartbeat(metrics) => {
                debug!("处理来自Worker {} 的心跳", metrics.worker_id);
                self.cluster
                    .report_heartbeat(&metrics.worker_id, metrics)
                    .await?;
                self.coordinator
                    .record_worker_heartbeat(&metrics.worker_id, metrics)
                    .await
            }
            WorkerEvent::JobLeased {
                worker_id, job_id, ..
            } => {
                if !self.transition_ok(job_id, JobStatus::Dispatched).await? {
                    return Ok(());
                }
                self.coordinator.mark_job_dispatched(job_id, worker_id).await
            }
            WorkerEvent::JobStarted {
                worker_id, job_id, ..
            } => {
                if !self.transition_ok(job_id, JobStatus::Processing).await? {
                    return Ok(());
                }
                self.coordinator.register_job(job_id, worker_id).await
            }
            WorkerEvent::JobProgress {
                job_id, percent, ..
            } => {
                if !self.transition_ok(job_id, JobStatus::Processing).await? {
                    return Ok(());
                }
                self.coordinator.update_job_progress(job_id, *percent).await
            }
            WorkerEvent::JobCompleted {
                worker_id,
                job_id,
                processing_ms,
                ..
            } => {
                if !self.transition_ok(job_id, JobStatus::Completed).await? {
                    return Ok(());
                }
                self.coordinator
                    .mark_job_completed(job_id, worker_id, *processing_ms)
                    .await
            }
            WorkerEvent::JobFailed {
                worker_id,
                job_id,
                reason,
                ..
            } => {
                if !self.transition_ok(job_id, JobStatus::Failed).await? {
                    return Ok(());
                }
                self.coordinator
                    .handle_job_failure(job_id, worker_id, reason)
                    .await
            }
        }
    }

    /// 校验事件蕴含的状态转换；作业缺失或转换非法时忽略该事件
    async fn transition_ok(&self, job_id: &str, to: JobStatus) -> OrchestratorResult<bool> {
        let Some(job) = self.job_repository.get(job_id).await? else {
            warn!("收到未知作业 {} 的事件，作业可能已被清理", job_id);
            return Ok(false);
        };

        if !Self::transition_allowed(job.status, to) {
            warn!(
                "作业 {} 的状态转换无效: {} -> {}，忽略",
                job_id, job.status, to
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn transition_allowed(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;

        match (from, to) {
            (Queued, Dispatched) => true,
            (Dispatched, Processing) => true,
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            (Dispatched, Failed) => true, // 熔断打开时作业未开始就失败
            (RecoveryPending, Completed) => true, // 恢复与完成赛跑，完成者赢
            (Retrying, Completed) => true,
            (from, to) if from == to => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docflow_domain::{WorkerMetrics, WorkerState};
    use docflow_infrastructure::MetricsCollector;

    use crate::queue_manager::PriorityQueueManager;
    use crate::test_utils::mocks::{
        test_config, CapturingNotificationSink, JobBuilder, MockAuditStore, MockJobRepository,
        MockQueueBroker, MockWorkerLauncher, MockWorkerRepository, WorkerRecordBuilder,
    };

    struct Harness {
        listener: StateListener,
        event_tx: Option<mpsc::Sender<WorkerEvent>>,
        job_repo: Arc<MockJobRepository>,
        worker_repo: Arc<MockWorkerRepository>,
        sink: Arc<CapturingNotificationSink>,
    }

    fn make_harness(
        jobs: Vec<docflow_domain::Job>,
        workers: Vec<docflow_domain::WorkerRecord>,
    ) -> Harness {
        let job_repo = Arc::new(MockJobRepository::with_jobs(jobs));
        let worker_repo = Arc::new(MockWorkerRepository::with_workers(workers));
        let broker = Arc::new(MockQueueBroker::new());
        let audit = Arc::new(MockAuditStore::new());
        let sink = Arc::new(CapturingNotificationSink::new());
        let metrics = Arc::new(MetricsCollector::new());
        let launcher = Arc::new(MockWorkerLauncher::new());

        let config = test_config();

        let (event_tx, event_rx) = mpsc::channel(32);
        let (failure_tx, failure_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(16);

        let cluster = Arc::new(ClusterManager::new(
            &config,
            launcher,
            worker_repo.clone(),
            broker.clone(),
            metrics.clone(),
            failure_tx,
            command_rx,
        ));
        let queue_manager = Arc::new(PriorityQueueManager::new(
            broker,
            job_repo.clone(),
            sink.clone(),
            metrics.clone(),
            config.queue.clone(),
        ));
        let coordinator = Arc::new(FailureRecoveryCoordinator::new(
            job_repo.clone(),
            worker_repo.clone(),
            audit,
            sink.clone(),
            metrics,
            queue_manager,
            command_tx,
            failure_rx,
            config.recovery.clone(),
        ));
        let listener = StateListener::new(coordinator, cluster, job_repo.clone(), event_rx);

        Harness {
            listener,
            event_tx: Some(event_tx),
            job_repo,
            worker_repo,
            sink,
        }
    }

    /// 把事件全部送入通道后关闭发送端，run()消费完即返回
    async fn drive(harness: &mut Harness, events: Vec<WorkerEvent>) {
        let tx = harness.event_tx.take().expect("事件通道只能驱动一次");
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        harness.listener.run().await;
    }

    #[tokio::test]
    async fn test_lifecycle_events_drive_job_to_completion() {
        let mut harness = make_harness(
            vec![JobBuilder::new("job-1").build()],
            vec![WorkerRecordBuilder::new("worker-1").build()],
        );

        drive(
            &mut harness,
            vec![
                WorkerEvent::job_leased("worker-1", "job-1"),
                WorkerEvent::job_started("worker-1", "job-1"),
                WorkerEvent::job_progress("worker-1", "job-1", 50),
                WorkerEvent::job_completed("worker-1", "job-1", 6_000),
            ],
        )
        .await;

        let job = harness.job_repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100);

        let worker = harness.worker_repo.get("worker-1").await.unwrap().unwrap();
        assert_eq!(worker.jobs_completed_total, 1);

        let kinds: Vec<&str> = harness
            .sink
            .events_for_job("job-1")
            .iter()
            .map(|event| event.event_type())
            .collect();
        assert_eq!(kinds, vec!["started", "progress", "completed"]);
    }

    #[tokio::test]
    async fn test_out_of_order_start_is_ignored() {
        let mut harness = make_harness(vec![JobBuilder::new("job-1").build()], vec![]);

        // 没有先行的租约事件，QUEUED -> PROCESSING不合法
        drive(
            &mut harness,
            vec![WorkerEvent::job_started("worker-1", "job-1")],
        )
        .await;

        let job = harness.job_repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(harness.sink.events_for_job("job-1").is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_reaches_worker_and_job() {
        let mut harness = make_harness(
            vec![JobBuilder::new("job-1")
                .with_status(JobStatus::Processing)
                .with_worker("worker-1")
                .build()],
            vec![WorkerRecordBuilder::new("worker-1")
                .with_current_job("job-1")
                .heartbeat_ms_ago(30_000)
                .build()],
        );

        let metrics = WorkerMetrics {
            worker_id: "worker-1".to_string(),
            current_job_id: Some("job-1".to_string()),
            avg_processing_ms: 4_500.0,
            jobs_completed_total: 3,
            timestamp: Utc::now(),
        };
        drive(&mut harness, vec![WorkerEvent::heartbeat(metrics.clone())]).await;

        let worker = harness.worker_repo.get("worker-1").await.unwrap().unwrap();
        assert_eq!(worker.last_heartbeat, metrics.timestamp);
        assert_eq!(worker.avg_processing_ms, 4_500.0);

        let job = harness.job_repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.last_heartbeat_at, Some(metrics.timestamp));
    }

    #[tokio::test]
    async fn test_failed_event_schedules_retry() {
        let mut harness = make_harness(
            vec![JobBuilder::new("job-1")
                .with_status(JobStatus::Processing)
                .with_worker("worker-1")
                .build()],
            vec![WorkerRecordBuilder::new("worker-1")
                .with_current_job("job-1")
                .build()],
        );

        drive(
            &mut harness,
            vec![WorkerEvent::job_failed("worker-1", "job-1", "提取超时")],
        )
        .await;

        let job = harness.job_repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.retry_count, 1);

        let worker = harness.worker_repo.get("worker-1").await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerState::Idle);
    }

    #[tokio::test]
    async fn test_completion_wins_over_recovery_quarantine() {
        // 清扫误判后Worker交付了结果：完成覆盖恢复标记
        let mut harness = make_harness(
            vec![JobBuilder::new("job-1")
                .with_status(JobStatus::RecoveryPending)
                .build()],
            vec![WorkerRecordBuilder::new("worker-1").build()],
        );

        drive(
            &mut harness,
            vec![WorkerEvent::job_completed("worker-1", "job-1", 9_000)],
        )
        .await;

        let job = harness.job_repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failure_for_quarantined_job_is_ignored() {
        // 已进入恢复流程的作业不接受迟到的失败信号，避免重复安排重试
        let mut harness = make_harness(
            vec![JobBuilder::new("job-1")
                .with_status(JobStatus::RecoveryPending)
                .with_retry_count(1)
                .build()],
            vec![],
        );

        drive(
            &mut harness,
            vec![WorkerEvent::job_failed("worker-1", "job-1", "迟到的失败")],
        )
        .await;

        let job = harness.job_repo.get("job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::RecoveryPending);
        assert_eq!(job.retry_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_job_event_is_benign() {
        let mut harness = make_harness(vec![], vec![]);

        drive(
            &mut harness,
            vec![WorkerEvent::job_completed("worker-1", "ghost", 1_000)],
        )
        .await;

        assert!(harness.sink.events_for_job("ghost").is_empty());
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;

        assert!(StateListener::transition_allowed(Queued, Dispatched));
        assert!(StateListener::transition_allowed(Dispatched, Processing));
        assert!(StateListener::transition_allowed(Processing, Completed));
        assert!(StateListener::transition_allowed(Processing, Failed));
        assert!(StateListener::transition_allowed(Dispatched, Failed));
        assert!(StateListener::transition_allowed(RecoveryPending, Completed));
        assert!(StateListener::transition_allowed(Processing, Processing));

        assert!(!StateListener::transition_allowed(Queued, Processing));
        assert!(!StateListener::transition_allowed(Queued, Completed));
        assert!(!StateListener::transition_allowed(Completed, Processing));
        assert!(!StateListener::transition_allowed(RecoveryPending, Failed));
        assert!(!StateListener::transition_allowed(Retrying, Failed));
    }
}
