use thiserror::Error;

/// 编排核心错误类型定义
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("作业未找到: {id}")]
    JobNotFound { id: String },

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("Worker故障: {worker_id} - {reason}")]
    WorkerFailure { worker_id: String, reason: String },

    #[error("熔断器打开，拒绝调用: {service}")]
    CircuitBreakerOpen { service: String },

    #[error("外部依赖调用失败: {0}")]
    DependencyFailure(String),

    #[error("作业执行超时")]
    ExecutionTimeout,

    #[error("重试次数耗尽: 作业 {job_id} 已重试 {retry_count} 次")]
    RetriesExhausted { job_id: String, retry_count: u32 },

    #[error("消息队列错误: {0}")]
    QueueBroker(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("未知的选择算法: {0}")]
    UnknownAlgorithm(String),

    #[error("无效的状态转换: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
