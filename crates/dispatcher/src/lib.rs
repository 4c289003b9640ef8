//! 调度域：分级队列、负载均衡、集群伸缩与故障恢复
//!
//! 本crate承载编排核心的协调逻辑：作业经`queue_manager`分级入队，
//! `cluster`维护弹性Worker池，`load_balancer`给出选择与伸缩建议，
//! `recovery`负责失联检测与退避重试，`state_listener`串行消费
//! Worker运行时事件并按到达顺序应用状态变更。

pub mod cluster;
pub mod load_balancer;
pub mod queue_manager;
pub mod recovery;
pub mod state_listener;
pub mod strategies;

#[cfg(test)]
pub mod test_utils;

pub use cluster::{ClusterCommand, ClusterHealth, ClusterManager, WorkerFailureSignal};
pub use load_balancer::{LoadBalancer, LoadBalancerConfig, LoadBalancerStats, LoadDecision, ScaleAction};
pub use queue_manager::{PriorityQueueManager, TierQueueStats};
pub use recovery::{FailureRecoveryCoordinator, RecoveryHealthReport, RecoveryStats};
pub use state_listener::StateListener;
pub use strategies::{SelectionStrategy, StrategyKind, StrategyTuning};
