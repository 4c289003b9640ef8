use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use docflow_core::{OrchestratorError, OrchestratorResult};
use docflow_domain::entities::TierName;
use docflow_domain::messaging::{JobMessage, QueueBroker};

/// 内存分级队列实现
///
/// 每个层级维护一个优先级堆，同优先级按入队顺序出队，
/// 适用于嵌入式部署场景。容量上限触发背压拒绝。
pub struct InMemoryQueueBroker {
    tiers: HashMap<TierName, TierQueue>,
    /// 单层级容量上限（0表示无限制）
    capacity: usize,
}

struct TierQueue {
    state: Mutex<QueueState>,
    depth: AtomicU32,
}

struct QueueState {
    entries: BinaryHeap<QueuedMessage>,
    next_seq: u64,
}

struct QueuedMessage {
    priority: u8,
    seq: u64,
    message: JobMessage,
}

// 数值越小优先级越高；同优先级按seq先入先出
impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl InMemoryQueueBroker {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let tiers = TierName::all()
            .iter()
            .map(|tier| {
                (
                    *tier,
                    TierQueue {
                        state: Mutex::new(QueueState {
                            entries: BinaryHeap::new(),
                            next_seq: 0,
                        }),
                        depth: AtomicU32::new(0),
                    },
                )
            })
            .collect();
        Self { tiers, capacity }
    }

    fn tier(&self, tier: TierName) -> OrchestratorResult<&TierQueue> {
        self.tiers
            .get(&tier)
            .ok_or_else(|| OrchestratorError::QueueBroker(format!("未知层级队列: {tier}")))
    }
}

impl Default for InMemoryQueueBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBroker for InMemoryQueueBroker {
    async fn enqueue(
        &self,
        tier: TierName,
        message: &JobMessage,
        priority: u8,
    ) -> OrchestratorResult<usize> {
        let queue = self.tier(tier)?;
        let mut state = queue.state.lock().await;

        if self.capacity > 0 && state.entries.len() >= self.capacity {
            warn!("队列 {} 已达容量上限 {}，拒绝消息 {}", tier, self.capacity, message.id);
            return Err(OrchestratorError::QueueBroker(format!(
                "队列 {tier} 已满，消息 {} 被背压拒绝",
                message.id
            )));
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        // 排位 = 出队顺序排在它之前的消息数 + 1
        let position = state
            .entries
            .iter()
            .filter(|e| e.priority < priority || (e.priority == priority && e.seq < seq))
            .count()
            + 1;

        state.entries.push(QueuedMessage {
            priority,
            seq,
            message: message.clone(),
        });
        queue
            .depth
            .store(state.entries.len() as u32, AtomicOrdering::Relaxed);

        debug!("消息 {} 入队 {} (优先级: {}, 排位: {})", message.id, tier, priority, position);
        Ok(position)
    }

    async fn lease(&self, tier: TierName) -> OrchestratorResult<Option<JobMessage>> {
        let queue = self.tier(tier)?;
        let mut state = queue.state.lock().await;

        let leased = state.entries.pop().map(|entry| entry.message);
        queue
            .depth
            .store(state.entries.len() as u32, AtomicOrdering::Relaxed);

        if let Some(message) = &leased {
            debug!("从队列 {} 租出消息 {} (作业: {})", tier, message.id, message.job_id);
        }
        Ok(leased)
    }

    async fn remove(&self, job_id: &str) -> OrchestratorResult<bool> {
        for (tier, queue) in &self.tiers {
            let mut state = queue.state.lock().await;
            let before = state.entries.len();
            state.entries.retain(|entry| entry.message.job_id != job_id);
            if state.entries.len() != before {
                queue
                    .depth
                    .store(state.entries.len() as u32, AtomicOrdering::Relaxed);
                debug!("作业 {} 的消息已从队列 {} 移除", job_id, tier);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get(&self, job_id: &str) -> OrchestratorResult<Option<JobMessage>> {
        for queue in self.tiers.values() {
            let state = queue.state.lock().await;
            if let Some(entry) = state.entries.iter().find(|e| e.message.job_id == job_id) {
                return Ok(Some(entry.message.clone()));
            }
        }
        Ok(None)
    }

    async fn depth(&self, tier: TierName) -> OrchestratorResult<u32> {
        Ok(self.tier(tier)?.depth.load(AtomicOrdering::Relaxed))
    }

    async fn purge(&self, tier: TierName) -> OrchestratorResult<()> {
        let queue = self.tier(tier)?;
        let mut state = queue.state.lock().await;
        let purged = state.entries.len();
        state.entries.clear();
        queue.depth.store(0, AtomicOrdering::Relaxed);
        debug!("队列 {} 已清空 {} 条消息", tier, purged);
        Ok(())
    }
}
