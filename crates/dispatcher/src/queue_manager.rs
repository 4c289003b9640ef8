//! 分级优先队列管理
//!
//! 接收作业提交，按套餐与文件大小归类到premium/normal/large三个层级，
//! 赋予数值优先级后交给队列代理。同一作业ID重复提交幂等处理：
//! 未终态的重复提交返回已有回执，终态作业允许覆盖重提。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use docflow_core::QueueConfig;
use docflow_domain::{
    Alert, AlertType, Job, JobEvent, JobHandle, JobMessage, JobRepository, JobStatus,
    JobSubmission, NotificationSink, OrchestratorResult, QueueBroker, TierName,
};
use docflow_infrastructure::MetricsCollector;

/// 单个层级的队列统计
#[derive(Debug, Clone, Serialize)]
pub struct TierQueueStats {
    /// 仍在队列中等待的消息数
    pub waiting: u32,
    /// 已租出、正在执行的作业数
    pub active: usize,
    pub completed_last_hour: usize,
    pub failed_last_hour: usize,
    /// 最近一小时开始执行的作业的平均排队等待时间
    pub avg_wait_ms: f64,
}

pub struct PriorityQueueManager {
    broker: Arc<dyn QueueBroker>,
    job_repository: Arc<dyn JobRepository>,
    sink: Arc<dyn NotificationSink>,
    metrics: Arc<MetricsCollector>,
    config: QueueConfig,
}

impl PriorityQueueManager {
    pub fn new(
        broker: Arc<dyn QueueBroker>,
        job_repository: Arc<dyn JobRepository>,
        sink: Arc<dyn NotificationSink>,
        metrics: Arc<MetricsCollector>,
        config: QueueConfig,
    ) -> Self {
        Self {
            broker,
            job_repository,
            sink,
            metrics,
            config,
        }
    }

    /// 根据套餐与文件大小决定层级
    ///
    /// 超过大文件阈值的作业一律进large层，避免大文件拖慢高优先级队列。
    /// 未知套餐按normal处理，分类永远不会拒绝提交。
    pub fn classify(&self, plan: &str, size_bytes: u64) -> TierName {
        if size_bytes > self.config.large_file_threshold_bytes {
            return TierName::Large;
        }
        match plan.to_ascii_lowercase().as_str() {
            "enterprise" | "pro" | "unlimited" => TierName::Premium,
            _ => TierName::Normal,
        }
    }

    /// 套餐到数值优先级的映射，数字越小越优先
    pub fn priority_of(&self, plan: &str) -> u8 {
        match plan.to_ascii_lowercase().as_str() {
            "unlimited" => 1,
            "enterprise" => 2,
            "pro" => 3,
            "basic" => 4,
            _ => 5,
        }
    }

    /// 接收一次作业提交
    ///
    /// 同ID且未达终态的作业视为重复提交，直接返回已有作业的回执；
    /// 终态作业允许同ID重提，旧记录被覆盖并重新开始计数。
    pub async fn admit(&self, submission: &JobSubmission) -> OrchestratorResult<JobHandle> {
        if let Some(existing) = self.job_repository.get(&submission.job_id).await? {
            if !existing.is_terminal() {
                debug!(
                    "作业 {} 已在处理流程中（状态: {}），返回已有回执",
                    existing.id, existing.status
                );
                let depth = self.broker.depth(existing.tier).await? as usize;
                return Ok(JobHandle {
                    job_id: existing.id,
                    tier: existing.tier,
                    priority: existing.priority,
                    position: depth,
                    deduplicated: true,
                });
            }

            info!(
                "作业 {} 此前已达终态（{}），接受同ID重提",
                existing.id, existing.status
            );
            let tier = self.classify(&submission.plan, submission.size_bytes);
            let priority = self.priority_of(&submission.plan);
            let job = Job::from_submission(submission, tier, priority);
            self.job_repository.update(&job).await?;
            return self.enqueue_job(&job).await;
        }

        let tier = self.classify(&submission.plan, submission.size_bytes);
        let priority = self.priority_of(&submission.plan);
        let job = Job::from_submission(submission, tier, priority);
        self.job_repository.create(&job).await?;
        self.enqueue_job(&job).await
    }

    async fn enqueue_job(&self, job: &Job) -> OrchestratorResult<JobHandle> {
        let message = JobMessage::from_job(job);
        let position = self.broker.enqueue(job.tier, &message, job.priority).await?;

        info!(
            "作业 {} 入队: 层级={} 优先级={} 排位={}",
            job.id, job.tier, job.priority, position
        );

        self.publish_queued_event(job, position).await;
        self.check_queue_depth(job.tier).await;
        self.metrics.record_job_admitted(job.tier.as_str(), job.priority);

        Ok(JobHandle {
            job_id: job.id.clone(),
            tier: job.tier,
            priority: job.priority,
            position,
            deduplicated: false,
        })
    }

    /// 恢复流程的再入队：保留作业原有层级与优先级
    pub async fn resubmit(&self, job: &Job) -> OrchestratorResult<usize> {
        let message = JobMessage::from_job(job);
        let position = self.broker.enqueue(job.tier, &message, job.priority).await?;

        info!(
            "作业 {} 重新入队: 层级={} 重试次数={} 排位={}",
            job.id, job.tier, job.retry_count, position
        );

        self.publish_queued_event(job, position).await;
        self.check_queue_depth(job.tier).await;

        Ok(position)
    }

    /// 撤下作业尚未被租走的队列消息，恢复流程接管排队超时作业时调用
    pub async fn withdraw(&self, job_id: &str) -> OrchestratorResult<bool> {
        let removed = self.broker.remove(job_id).await?;
        if removed {
            debug!("作业 {} 的队列消息已撤下", job_id);
        }
        Ok(removed)
    }

    pub async fn get(&self, job_id: &str) -> OrchestratorResult<Option<Job>> {
        self.job_repository.get(job_id).await
    }

    /// 各层级的队列与执行统计
    pub async fn stats(&self) -> OrchestratorResult<HashMap<TierName, TierQueueStats>> {
        let active_jobs = self.job_repository.list_active().await?;
        let completed_jobs = self
            .job_repository
            .list_by_status(JobStatus::Completed)
            .await?;
        let failed_jobs = self.job_repository.list_by_status(JobStatus::Failed).await?;

        let cutoff = Utc::now() - Duration::hours(1);
        let mut stats = HashMap::new();

        for tier in TierName::all() {
            let waiting = self.broker.depth(tier).await?;
            let active = active_jobs
                .iter()
                .filter(|job| {
                    job.tier == tier
                        && matches!(job.status, JobStatus::Dispatched | JobStatus::Processing)
                })
                .count();
            let completed_last_hour = completed_jobs
                .iter()
                .filter(|job| {
                    job.tier == tier && job.completed_at.map_or(false, |at| at >= cutoff)
                })
                .count();
            let failed_last_hour = failed_jobs
                .iter()
                .filter(|job| {
                    job.tier == tier && job.completed_at.map_or(false, |at| at >= cutoff)
                })
                .count();

            let waits: Vec<i64> = active_jobs
                .iter()
                .chain(completed_jobs.iter())
                .chain(failed_jobs.iter())
                .filter(|job| job.tier == tier)
                .filter_map(|job| {
                    let started = job.started_at?;
                    if started >= cutoff {
                        Some((started - job.enqueued_at).num_milliseconds())
                    } else {
                        None
                    }
                })
                .collect();
            let avg_wait_ms = if waits.is_empty() {
                0.0
            } else {
                waits.iter().sum::<i64>() as f64 / waits.len() as f64
            };

            stats.insert(
                tier,
                TierQueueStats {
                    waiting,
                    active,
                    completed_last_hour,
                    failed_last_hour,
                    avg_wait_ms,
                },
            );
        }

        Ok(stats)
    }

    async fn publish_queued_event(&self, job: &Job, position: usize) {
        let event = JobEvent::queued(&job.id, job.tier, job.priority, position);
        if let Err(e) = self.sink.publish_job_event(&event).await {
            warn!("作业 {} 的入队事件发布失败: {}", job.id, e);
        }
    }

    /// 等待深度达到阈值时发出告警，通知失败不阻塞主流程
    async fn check_queue_depth(&self, tier: TierName) {
        let depth = match self.broker.depth(tier).await {
            Ok(depth) => depth as usize,
            Err(e) => {
                warn!("查询 {} 层队列深度失败: {}", tier, e);
                return;
            }
        };

        if depth >= self.config.high_queue_length_threshold {
            warn!(
                "{} 层等待队列过长: {} (阈值: {})",
                tier, depth, self.config.high_queue_length_threshold
            );
            let alert = Alert::warning(
                AlertType::HighQueueLength,
                format!("{} 层等待队列深度达到 {}", tier, depth),
                json!({
                    "tier": tier.as_str(),
                    "depth": depth,
                    "threshold": self.config.high_queue_length_threshold,
                }),
            );
            if let Err(e) = self.sink.publish_alert(&alert).await {
                warn!("队列深度告警发布失败: {}", e);
            }
        }
    }
}
