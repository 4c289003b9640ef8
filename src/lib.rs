//! 文档处理作业编排与弹性恢复
//!
//! 以库形式嵌入宿主进程：提交的作业按套餐与体积分级入队，弹性
//! Worker池租取执行，熔断器隔离提取服务故障，失联作业按退避
//! 策略自动重试。入口是[`OrchestratorApp`]。

pub mod app;
pub mod shutdown;

pub use app::OrchestratorApp;
pub use shutdown::ShutdownManager;

pub use docflow_core::{init_logging, AppConfig, OrchestratorError, OrchestratorResult};
pub use docflow_domain::{Job, JobHandle, JobStatus, JobSubmission, TierName};
pub use docflow_worker::{
    DocumentExtractor, ExtractionOutput, ExtractionRequest, ProgressReporter, SimulatedExtractor,
};
