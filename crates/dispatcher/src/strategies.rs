//! Worker选择策略
//!
//! 所有策略只读取Worker状态快照做出选择，不修改任何实体。
//! 加权轮询为默认策略，评分相同的Worker通过每层独立的轮询游标打散。

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use docflow_core::{OrchestratorError, OrchestratorResult, QueueConfig};
use docflow_domain::{TierName, WorkerRecord};

/// Worker选择策略接口
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    /// 从候选快照中为指定层级挑选一个Worker
    ///
    /// 候选列表由调用方提供，策略自行过滤掉不可参与调度的状态
    /// （ERROR/RECOVERING）。没有合适的Worker时返回`Ok(None)`。
    async fn select_worker(
        &self,
        tier: TierName,
        candidates: &[WorkerRecord],
    ) -> OrchestratorResult<Option<WorkerRecord>>;

    /// 重置该层级的轮询游标，仅对有状态策略有意义
    fn reset_cursor(&self, _tier: TierName) {}

    fn name(&self) -> &str;
}

/// 评分参数
///
/// 层级基础权重来自队列配置，其余为经验值：空闲加分要大于
/// 常见的慢速扣分，否则空闲Worker会输给刚出错的忙碌Worker。
#[derive(Debug, Clone)]
pub struct StrategyTuning {
    /// premium/normal/large的基础权重
    pub tier_weights: [f64; 3],
    /// 空闲Worker加分
    pub idle_bonus: f64,
    /// 平均处理耗时每满一秒的扣分
    pub slow_penalty_per_sec: f64,
    /// 近期出过错的Worker扣分
    pub error_penalty: f64,
    /// 错误被视为"近期"的时间窗口
    pub recent_error_window_ms: i64,
}

impl StrategyTuning {
    pub fn from_queue_config(queue: &QueueConfig) -> Self {
        Self {
            tier_weights: [
                queue.premium.priority_weight as f64,
                queue.normal.priority_weight as f64,
                queue.large.priority_weight as f64,
            ],
            ..Self::default()
        }
    }

    fn weight_for(&self, tier: TierName) -> f64 {
        self.tier_weights[tier_index(tier)]
    }
}

impl Default for StrategyTuning {
    fn default() -> Self {
        Self {
            tier_weights: [100.0, 50.0, 20.0],
            idle_bonus: 50.0,
            slow_penalty_per_sec: 1.0,
            error_penalty: 30.0,
            recent_error_window_ms: 300_000,
        }
    }
}

fn tier_index(tier: TierName) -> usize {
    match tier {
        TierName::Premium => 0,
        TierName::Normal => 1,
        TierName::Large => 2,
    }
}

/// 空闲优先，其次平均耗时最短
fn pick_least_loaded<'a>(workers: &[&'a WorkerRecord]) -> Option<&'a WorkerRecord> {
    workers
        .iter()
        .min_by(|a, b| {
            let a_busy = a.current_job_id.is_some();
            let b_busy = b.current_job_id.is_some();
            a_busy.cmp(&b_busy).then_with(|| {
                a.avg_processing_ms
                    .partial_cmp(&b.avg_processing_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        })
        .copied()
}

/// 加权轮询策略：评分最高者胜出，并列者按每层游标轮流
pub struct WeightedRoundRobinStrategy {
    tuning: StrategyTuning,
    cursors: [AtomicUsize; 3],
}

impl WeightedRoundRobinStrategy {
    pub fn new(tuning: StrategyTuning) -> Self {
        Self {
            tuning,
            cursors: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    fn score(&self, worker: &WorkerRecord, now: DateTime<Utc>) -> f64 {
        let mut score = self.tuning.weight_for(worker.tier);
        if worker.is_available() {
            score += self.tuning.idle_bonus;
        }
        score -= worker.avg_processing_ms / 1000.0 * self.tuning.slow_penalty_per_sec;
        if let Some(at) = worker.last_error_at {
            if (now - at).num_milliseconds() <= self.tuning.recent_error_window_ms {
                score -= self.tuning.error_penalty;
            }
        }
        score
    }
}

impl Default for WeightedRoundRobinStrategy {
    fn default() -> Self {
        Self::new(StrategyTuning::default())
    }
}

#[async_trait]
impl SelectionStrategy for WeightedRoundRobinStrategy {
    async fn select_worker(
        &self,
        tier: TierName,
        candidates: &[WorkerRecord],
    ) -> OrchestratorResult<Option<WorkerRecord>> {
        let usable: Vec<&WorkerRecord> = candidates.iter().filter(|w| w.is_active()).collect();
        if usable.is_empty() {
            debug!("{} 层没有可参与评分的Worker", tier);
            return Ok(None);
        }

        let now = Utc::now();
        let scored: Vec<(f64, &WorkerRecord)> =
            usable.iter().map(|w| (self.score(w, now), *w)).collect();
        let best = scored
            .iter()
            .map(|(s, _)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<&WorkerRecord> = scored
            .iter()
            .filter(|(s, _)| (best - *s).abs() < 1e-9)
            .map(|(_, w)| *w)
            .collect();

        let index = self.cursors[tier_index(tier)].fetch_add(1, Ordering::Relaxed) % tied.len();
        let selected = tied[index];

        debug!(
            "加权轮询选择Worker: {} (评分: {:.1}, 并列数: {})",
            selected.id,
            best,
            tied.len()
        );

        Ok(Some(selected.clone()))
    }

    fn reset_cursor(&self, tier: TierName) {
        self.cursors[tier_index(tier)].store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        "WeightedRoundRobin"
    }
}

/// 最低负载策略：优先无在手作业的Worker，其次平均耗时最短
pub struct LeastLoadedStrategy;

impl LeastLoadedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastLoadedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SelectionStrategy for LeastLoadedStrategy {
    async fn select_worker(
        &self,
        tier: TierName,
        candidates: &[WorkerRecord],
    ) -> OrchestratorResult<Option<WorkerRecord>> {
        let usable: Vec<&WorkerRecord> = candidates.iter().filter(|w| w.is_active()).collect();
        if usable.is_empty() {
            debug!("{} 层没有可用的Worker", tier);
            return Ok(None);
        }

        let selected = pick_least_loaded(&usable);
        if let Some(worker) = selected {
            debug!(
                "最低负载策略选择Worker: {} (平均耗时: {:.0}ms)",
                worker.id, worker.avg_processing_ms
            );
        }

        Ok(selected.cloned())
    }

    fn name(&self) -> &str {
        "LeastLoaded"
    }
}

/// 最快响应策略：空闲Worker中平均耗时最短者；无空闲时退回最低负载
pub struct FastestResponseStrategy;

impl FastestResponseStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FastestResponseStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SelectionStrategy for FastestResponseStrategy {
    async fn select_worker(
        &self,
        tier: TierName,
        candidates: &[WorkerRecord],
    ) -> OrchestratorResult<Option<WorkerRecord>> {
        let usable: Vec<&WorkerRecord> = candidates.iter().filter(|w| w.is_active()).collect();
        if usable.is_empty() {
            debug!("{} 层没有可用的Worker", tier);
            return Ok(None);
        }

        let idle: Vec<&WorkerRecord> = usable
            .iter()
            .filter(|w| w.is_available())
            .copied()
            .collect();
        if idle.is_empty() {
            debug!("{} 层没有空闲Worker，退回最低负载选择", tier);
            return Ok(pick_least_loaded(&usable).cloned());
        }

        let selected = idle
            .iter()
            .min_by(|a, b| {
                a.avg_processing_ms
                    .partial_cmp(&b.avg_processing_ms)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied();
        if let Some(worker) = selected {
            debug!(
                "最快响应策略选择Worker: {} (平均耗时: {:.0}ms)",
                worker.id, worker.avg_processing_ms
            );
        }

        Ok(selected.cloned())
    }

    fn name(&self) -> &str {
        "FastestResponse"
    }
}

/// 可配置的策略种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    WeightedRoundRobin,
    LeastLoaded,
    FastestResponse,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::WeightedRoundRobin => "weighted_round_robin",
            StrategyKind::LeastLoaded => "least_loaded",
            StrategyKind::FastestResponse => "fastest_response",
        }
    }

    pub fn build(&self, tuning: StrategyTuning) -> Arc<dyn SelectionStrategy> {
        match self {
            StrategyKind::WeightedRoundRobin => Arc::new(WeightedRoundRobinStrategy::new(tuning)),
            StrategyKind::LeastLoaded => Arc::new(LeastLoadedStrategy::new()),
            StrategyKind::FastestResponse => Arc::new(FastestResponseStrategy::new()),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted_round_robin" => Ok(StrategyKind::WeightedRoundRobin),
            "least_loaded" => Ok(StrategyKind::LeastLoaded),
            "fastest_response" => Ok(StrategyKind::FastestResponse),
            other => Err(OrchestratorError::UnknownAlgorithm(other.to_string())),
        }
    }
}
