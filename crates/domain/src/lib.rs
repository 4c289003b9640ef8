//! 领域层：作业、Worker、分级队列与恢复语义的类型与端口定义
//!
//! 只依赖docflow-core，不依赖任何具体基础设施。

pub mod entities;
pub mod events;
pub mod messaging;
pub mod repositories;
pub mod runtime;

pub use entities::*;
pub use events::*;
pub use messaging::*;
pub use repositories::*;
pub use runtime::*;

pub use docflow_core::{OrchestratorError, OrchestratorResult};
