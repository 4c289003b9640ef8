//! Worker运行时：租取作业、经熔断器调用文档提取服务、上报事件
//!
//! 集群管理器通过`WorkerLauncher`端口创建Worker；Worker与编排端
//! 只通过Worker事件通道交互，不直接触碰仓储。

pub mod extractor;
pub mod launcher;
pub mod service;

#[cfg(test)]
pub mod test_utils;

pub use extractor::{
    DocumentExtractor, ExtractionOutput, ExtractionRequest, ProgressReporter, SimulatedExtractor,
};
pub use launcher::TokioWorkerLauncher;
pub use service::DocumentWorker;
