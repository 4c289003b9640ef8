use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{OrchestratorError, OrchestratorResult};

/// 初始化日志系统
///
/// `log_format` 支持 "json" 与 "pretty" 两种输出格式。
/// 重复初始化（例如测试中）不视为错误。
pub fn init_logging(log_level: &str, log_format: &str) -> OrchestratorResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        _ => {
            return Err(OrchestratorError::Configuration(format!(
                "不支持的日志格式: {log_format}"
            )))
        }
    };

    // 全局subscriber已存在时忽略，方便在测试中多次调用
    let _ = result;
    Ok(())
}
