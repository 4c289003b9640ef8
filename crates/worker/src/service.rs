//! 文档处理Worker运行时
//!
//! 每个Worker归属一个层级，循环从队列租取作业、经熔断器调用提取服务，
//! 并把租约、启动、进度、完成、失败与心跳事件送入Worker事件通道，
//! 由状态监听器串行落账。Worker自身不直接改写任何仓储记录。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use docflow_core::{CircuitBreaker, CircuitState, OrchestratorError, OrchestratorResult, WorkerConfig};
use docflow_domain::{JobMessage, QueueBroker, TierName, WorkerEvent, WorkerMetrics};

use crate::extractor::{DocumentExtractor, ExtractionRequest, ProgressReporter};

/// 单个Worker的处理统计，心跳据此生成指标快照
#[derive(Debug, Default)]
struct ProcessingStats {
    current_job_id: Option<String>,
    jobs_completed_total: u64,
    total_processing_ms: u64,
}

impl ProcessingStats {
    fn avg_processing_ms(&self) -> f64 {
        if self.jobs_completed_total == 0 {
            0.0
        } else {
            self.total_processing_ms as f64 / self.jobs_completed_total as f64
        }
    }
}

/// 文档处理Worker
///
/// 一次只处理一个作业；并发度靠层级内的Worker数量扩展，
/// 与WorkerRecord的单作业不变式保持一致。
/// 克隆共享同一份运行状态，供循环任务持有。
#[derive(Clone)]
pub struct DocumentWorker {
    worker_id: String,
    tier: TierName,
    config: WorkerConfig,
    broker: Arc<dyn QueueBroker>,
    extractor: Arc<dyn DocumentExtractor>,
    breaker: Arc<CircuitBreaker>,
    event_tx: mpsc::Sender<WorkerEvent>,
    stats: Arc<RwLock<ProcessingStats>>,
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
    running: Arc<RwLock<bool>>,
}

impl DocumentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: impl Into<String>,
        tier: TierName,
        config: WorkerConfig,
        broker: Arc<dyn QueueBroker>,
        extractor: Arc<dyn DocumentExtractor>,
        breaker: Arc<CircuitBreaker>,
        event_tx: mpsc::Sender<WorkerEvent>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            tier,
            config,
            broker,
            extractor,
            breaker,
            event_tx,
            stats: Arc::new(RwLock::new(ProcessingStats::default())),
            shutdown_tx: Arc::new(RwLock::new(None)),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn tier(&self) -> TierName {
        self.tier
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 启动租取循环与心跳循环
    pub async fn start(&self) -> OrchestratorResult<()> {
        let mut running = self.running.write().await;
        if *running {
            return Err(OrchestratorError::Internal(format!(
                "Worker {} 已在运行",
                self.worker_id
            )));
        }

        let (shutdown_tx, poll_rx) = broadcast::channel(1);
        let heartbeat_rx = shutdown_tx.subscribe();
        {
            let mut tx_guard = self.shutdown_tx.write().await;
            *tx_guard = Some(shutdown_tx);
        }

        let poller = self.clone();
        tokio::spawn(async move {
            poller.run_poll_loop(poll_rx).await;
        });

        let beater = self.clone();
        tokio::spawn(async move {
            beater.run_heartbeat_loop(heartbeat_rx).await;
        });

        *running = true;
        info!(
            "Worker {} 已启动: 层级={}, 轮询间隔={}ms, 心跳间隔={}ms",
            self.worker_id, self.tier, self.config.poll_interval_ms, self.config.heartbeat_interval_ms
        );
        Ok(())
    }

    /// 停止Worker，先收尾在手作业再退出
    pub async fn stop(&self) -> OrchestratorResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Ok(());
        }

        info!("停止Worker {}", self.worker_id);
        {
            let tx_guard = self.shutdown_tx.read().await;
            if let Some(ref shutdown_tx) = *tx_guard {
                let _ = shutdown_tx.send(());
            }
        }

        // 有限等待在手作业完成，超过作业超时就不再等
        let deadline = Instant::now() + Duration::from_millis(self.config.job_timeout_ms);
        while self.stats.read().await.current_job_id.is_some() {
            if Instant::now() >= deadline {
                warn!("Worker {} 停止时仍有在手作业，交由恢复流程处理", self.worker_id);
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        *running = false;
        info!("Worker {} 已停止", self.worker_id);
        Ok(())
    }

    async fn run_poll_loop(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown_rx.recv() => {
                    debug!("Worker {} 租取循环收到停止信号", self.worker_id);
                    break;
                }
            }
        }
    }

    async fn run_heartbeat_loop(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut heartbeat_interval =
            interval(Duration::from_millis(self.config.heartbeat_interval_ms));

        loop {
            tokio::select! {
                _ = heartbeat_interval.tick() => {
                    self.emit_heartbeat().await;
                }
                _ = shutdown_rx.recv() => {
                    debug!("Worker {} 心跳循环收到停止信号", self.worker_id);
                    break;
                }
            }
        }
    }

    /// 租取一次。熔断开路时不租，让作业留在队列里等恢复
    async fn poll_once(&self) {
        if self.breaker.get_state().await == CircuitState::Open {
            debug!("提取服务熔断开路，Worker {} 暂停租取", self.worker_id);
            return;
        }

        let message = match self.broker.lease(self.tier).await {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                warn!("Worker {} 租取 {} 层消息失败: {}", self.worker_id, self.tier, e);
                return;
            }
        };

        debug!("Worker {} 租到作业 {}", self.worker_id, message.job_id);
        self.send_event(WorkerEvent::job_leased(&self.worker_id, &message.job_id))
            .await;
        self.process_message(message).await;
    }

    /// 执行一个已租到的作业，所有结果都以事件形式上报
    async fn process_message(&self, message: JobMessage) {
        let job_id = message.job_id.clone();

        // 租约和启动之间熔断可能恰好打开，此时作业未启动直接失败，
        // 由恢复协调器按退避重新排队
        if self.breaker.get_state().await == CircuitState::Open {
            warn!("提取服务熔断开路，作业 {} 未执行即失败", job_id);
            self.send_event(WorkerEvent::job_failed(
                &self.worker_id,
                &job_id,
                "提取服务熔断开路，拒绝执行",
            ))
            .await;
            return;
        }

        {
            let mut stats = self.stats.write().await;
            stats.current_job_id = Some(job_id.clone());
        }
        self.send_event(WorkerEvent::job_started(&self.worker_id, &job_id))
            .await;

        let (progress_tx, mut progress_rx) = mpsc::channel(16);
        let request = ExtractionRequest::from_message(&message, ProgressReporter::new(progress_tx));
        let job_timeout = Duration::from_millis(self.config.job_timeout_ms);
        let extractor = Arc::clone(&self.extractor);
        let started = Instant::now();

        // 超时放在熔断器内部计作依赖失败，避免外层取消让熔断器
        // 的半开探测永远悬着
        let extraction = self.breaker.execute(move || async move {
            match tokio::time::timeout(job_timeout, extractor.extract(&request)).await {
                Ok(result) => result,
                Err(_) => Err(OrchestratorError::ExecutionTimeout),
            }
        });
        tokio::pin!(extraction);

        let outcome = loop {
            tokio::select! {
                result = &mut extraction => break result,
                Some(percent) = progress_rx.recv() => {
                    self.send_event(WorkerEvent::job_progress(&self.worker_id, &job_id, percent))
                        .await;
                }
            }
        };

        let processing_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => {
                {
                    let mut stats = self.stats.write().await;
                    stats.jobs_completed_total += 1;
                    stats.total_processing_ms += processing_ms;
                }
                info!(
                    "作业 {} 提取完成: {}页, {}字符, 耗时{}ms",
                    job_id, output.pages, output.characters, processing_ms
                );
                self.send_event(WorkerEvent::job_completed(
                    &self.worker_id,
                    &job_id,
                    processing_ms,
                ))
                .await;
            }
            Err(e) => {
                warn!("作业 {} 执行失败: {}", job_id, e);
                self.send_event(WorkerEvent::job_failed(&self.worker_id, &job_id, e.to_string()))
                    .await;
            }
        }

        let mut stats = self.stats.write().await;
        stats.current_job_id = None;
    }

    async fn emit_heartbeat(&self) {
        let metrics = self.metrics_snapshot().await;
        debug!(
            "Worker {} 心跳: 在手作业={:?}, 累计完成={}",
            self.worker_id, metrics.current_job_id, metrics.jobs_completed_total
        );
        self.send_event(WorkerEvent::heartbeat(metrics)).await;
    }

    /// 当前指标快照，随心跳上报
    pub async fn metrics_snapshot(&self) -> WorkerMetrics {
        let stats = self.stats.read().await;
        WorkerMetrics {
            worker_id: self.worker_id.clone(),
            current_job_id: stats.current_job_id.clone(),
            avg_processing_ms: stats.avg_processing_ms(),
            jobs_completed_total: stats.jobs_completed_total,
            timestamp: Utc::now(),
        }
    }

    /// 事件通道关闭说明编排端已退出，丢弃并告警
    async fn send_event(&self, event: WorkerEvent) {
        if self.event_tx.send(event).await.is_err() {
            warn!("事件通道已关闭，Worker {} 的事件被丢弃", self.worker_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mocks::{
        message_for, FailingExtractor, HangingExtractor, JobBuilder, MockQueueBroker,
    };
    use crate::SimulatedExtractor;
    use docflow_core::CircuitBreakerConfig;

    struct Harness {
        worker: DocumentWorker,
        broker: Arc<MockQueueBroker>,
        breaker: Arc<CircuitBreaker>,
        event_rx: mpsc::Receiver<WorkerEvent>,
    }

    fn worker_config(job_timeout_ms: u64) -> WorkerConfig {
        WorkerConfig {
            heartbeat_interval_ms: 10,
            poll_interval_ms: 10,
            job_timeout_ms,
            hostname: Some("test-host".to_string()),
        }
    }

    fn make_harness(extractor: Arc<dyn DocumentExtractor>, job_timeout_ms: u64) -> Harness {
        let broker = Arc::new(MockQueueBroker::new());
        let breaker = Arc::new(CircuitBreaker::with_config(
            "document-extractor",
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_millis(100),
                max_recovery_timeout: Duration::from_millis(800),
                backoff_multiplier: 2.0,
                call_timeout: Duration::from_secs(5),
            },
        ));
        let (event_tx, event_rx) = mpsc::channel(64);
        let worker = DocumentWorker::new(
            "worker-1",
            TierName::Normal,
            worker_config(job_timeout_ms),
            Arc::clone(&broker) as Arc<dyn QueueBroker>,
            extractor,
            Arc::clone(&breaker),
            event_tx,
        );
        Harness {
            worker,
            broker,
            breaker,
            event_rx,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<WorkerEvent>) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn kinds(events: &[WorkerEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|event| match event {
                WorkerEvent::Heartbeat(_) => "heartbeat",
                WorkerEvent::JobLeased { .. } => "leased",
                WorkerEvent::JobStarted { .. } => "started",
                WorkerEvent::JobProgress { .. } => "progress",
                WorkerEvent::JobCompleted { .. } => "completed",
                WorkerEvent::JobFailed { .. } => "failed",
            })
            .collect()
    }

    async fn enqueue(broker: &MockQueueBroker, job_id: &str) {
        let message = message_for(job_id);
        broker
            .enqueue(message.tier, &message, message.priority)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_poll_processes_leased_job_to_completion() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);
        enqueue(&harness.broker, "j1").await;

        harness.worker.poll_once().await;

        let events = drain(&mut harness.event_rx);
        assert_eq!(
            kinds(&events),
            vec!["leased", "started", "progress", "progress", "progress", "completed"]
        );
        assert_eq!(harness.broker.total_depth(), 0);

        let metrics = harness.worker.metrics_snapshot().await;
        assert_eq!(metrics.jobs_completed_total, 1);
        assert!(metrics.current_job_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_queue_poll_is_quiet() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);

        harness.worker.poll_once().await;

        assert!(drain(&mut harness.event_rx).is_empty());
    }

    #[tokio::test]
    async fn test_extraction_failure_emits_failed_event() {
        let mut harness = make_harness(Arc::new(FailingExtractor::new("解析器拒绝该文档")), 5_000);
        enqueue(&harness.broker, "j1").await;

        harness.worker.poll_once().await;

        let events = drain(&mut harness.event_rx);
        assert_eq!(kinds(&events), vec!["leased", "started", "failed"]);
        match &events[2] {
            WorkerEvent::JobFailed { job_id, reason, .. } => {
                assert_eq!(job_id, "j1");
                assert!(reason.contains("解析器拒绝该文档"));
            }
            other => panic!("意外事件: {other:?}"),
        }

        let metrics = harness.worker.metrics_snapshot().await;
        assert_eq!(metrics.jobs_completed_total, 0);
        assert!(metrics.current_job_id.is_none());
    }

    #[tokio::test]
    async fn test_job_timeout_fails_job_and_trips_breaker_counter() {
        let mut harness = make_harness(Arc::new(HangingExtractor), 50);
        enqueue(&harness.broker, "j1").await;

        harness.worker.poll_once().await;

        let events = drain(&mut harness.event_rx);
        assert_eq!(kinds(&events), vec!["leased", "started", "failed"]);
        match &events[2] {
            WorkerEvent::JobFailed { reason, .. } => assert!(reason.contains("超时")),
            other => panic!("意外事件: {other:?}"),
        }

        let stats = harness.breaker.get_stats().await;
        assert_eq!(stats.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_suspends_leasing() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);
        enqueue(&harness.broker, "j1").await;

        // 连续失败把熔断器打开
        for _ in 0..3 {
            let _: OrchestratorResult<()> = harness
                .breaker
                .execute(|| async { Err(OrchestratorError::DependencyFailure("拒绝连接".into())) })
                .await;
        }
        assert_eq!(harness.breaker.get_state().await, CircuitState::Open);

        harness.worker.poll_once().await;

        // 不租取，消息留在队列里
        assert!(drain(&mut harness.event_rx).is_empty());
        assert_eq!(harness.broker.total_depth(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opening_after_lease_fails_fast_without_start() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);

        for _ in 0..3 {
            let _: OrchestratorResult<()> = harness
                .breaker
                .execute(|| async { Err(OrchestratorError::DependencyFailure("拒绝连接".into())) })
                .await;
        }

        harness.worker.process_message(message_for("j1")).await;

        let events = drain(&mut harness.event_rx);
        assert_eq!(kinds(&events), vec!["failed"]);
        match &events[0] {
            WorkerEvent::JobFailed { reason, .. } => assert!(reason.contains("熔断")),
            other => panic!("意外事件: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_progress_events_flow_during_extraction() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);

        harness.worker.process_message(message_for("j1")).await;

        let events = drain(&mut harness.event_rx);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                WorkerEvent::JobProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![30, 60, 90]);
    }

    #[tokio::test]
    async fn test_completion_updates_rolling_average() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);

        harness.worker.process_message(message_for("j1")).await;
        harness.worker.process_message(message_for("j2")).await;

        let metrics = harness.worker.metrics_snapshot().await;
        assert_eq!(metrics.jobs_completed_total, 2);
        assert!(metrics.avg_processing_ms >= 0.0);
        drain(&mut harness.event_rx);
    }

    #[tokio::test]
    async fn test_heartbeat_carries_current_job() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);

        {
            let mut stats = harness.worker.stats.write().await;
            stats.current_job_id = Some("j9".to_string());
            stats.jobs_completed_total = 4;
            stats.total_processing_ms = 8_000;
        }
        harness.worker.emit_heartbeat().await;

        let events = drain(&mut harness.event_rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkerEvent::Heartbeat(metrics) => {
                assert_eq!(metrics.worker_id, "worker-1");
                assert_eq!(metrics.current_job_id.as_deref(), Some("j9"));
                assert_eq!(metrics.jobs_completed_total, 4);
                assert!((metrics.avg_processing_ms - 2_000.0).abs() < f64::EPSILON);
            }
            other => panic!("意外事件: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);

        harness.worker.start().await.unwrap();
        assert!(harness.worker.is_running().await);

        let again = harness.worker.start().await;
        assert!(matches!(again, Err(OrchestratorError::Internal(_))));

        harness.worker.stop().await.unwrap();
        assert!(!harness.worker.is_running().await);

        // 停止后可重新启动
        harness.worker.start().await.unwrap();
        harness.worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_running_worker_drains_queue_in_background() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);
        for i in 0..3 {
            enqueue(&harness.broker, &format!("j{i}")).await;
        }

        harness.worker.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        harness.worker.stop().await.unwrap();

        assert_eq!(harness.broker.total_depth(), 0);
        let events = drain(&mut harness.event_rx);
        let completed = events
            .iter()
            .filter(|event| matches!(event, WorkerEvent::JobCompleted { .. }))
            .count();
        assert_eq!(completed, 3);
        assert!(events
            .iter()
            .any(|event| matches!(event, WorkerEvent::Heartbeat(_))));
    }

    #[tokio::test]
    async fn test_large_tier_worker_only_leases_its_tier() {
        let mut harness = make_harness(Arc::new(SimulatedExtractor::with_timings(0, 0)), 5_000);
        let job = JobBuilder::new("j-large")
            .with_tier(TierName::Large)
            .with_size_bytes(64 * 1024 * 1024)
            .build();
        let message = JobMessage::from_job(&job);
        harness
            .broker
            .enqueue(TierName::Large, &message, message.priority)
            .await
            .unwrap();

        // Normal层Worker看不到Large层消息
        harness.worker.poll_once().await;

        assert!(drain(&mut harness.event_rx).is_empty());
        assert_eq!(harness.broker.total_depth(), 1);
    }
}
