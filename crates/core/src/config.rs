use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{OrchestratorError, OrchestratorResult};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub cluster: ClusterConfig,
    pub queue: QueueConfig,
    pub recovery: RecoveryConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

/// 集群伸缩配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// 每个Worker允许的平均等待作业数，超过则建议扩容
    pub scale_up_threshold: f64,
    /// 低于该值则建议缩容
    pub scale_down_threshold: f64,
    pub health_check_interval_ms: u64,
    pub scale_check_interval_ms: u64,
    pub scale_cooldown_ms: u64,
}

/// 队列与分级配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 超过该大小的作业一律进入large层级
    pub large_file_threshold_bytes: u64,
    /// 单层级等待深度告警阈值
    pub high_queue_length_threshold: usize,
    /// 内存队列背压上限
    pub backpressure_capacity: usize,
    /// 配置后使用RabbitMQ队列，否则使用内存队列
    pub amqp_url: Option<String>,
    pub premium: TierSettings,
    pub normal: TierSettings,
    pub large: TierSettings,
}

/// 单个层级的静态配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    pub priority_weight: u32,
    pub concurrency_limit: usize,
    pub min_workers: usize,
    pub max_workers: usize,
}

/// 故障恢复配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub heartbeat_stale_ms: u64,
    /// 作业进入processing后迟迟没有首个心跳的容忍时间
    pub bootstrap_heartbeat_ms: u64,
    pub max_queued_wait_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_factor: f64,
    pub sweep_interval_ms: u64,
}

/// 熔断器配置（毫秒表示，供配置文件使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub open_duration_ms: u64,
    pub max_open_duration_ms: u64,
    pub backoff_multiplier: f64,
    pub call_timeout_ms: u64,
}

/// Worker运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub heartbeat_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub job_timeout_ms: u64,
    pub hostname: Option<String>,
}

/// 日志与审计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    /// 配置后故障审计落SQLite，否则仅驻留内存
    pub audit_database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig {
                min_workers: 1,
                max_workers: 8,
                scale_up_threshold: 4.0,
                scale_down_threshold: 1.0,
                health_check_interval_ms: 5_000,
                scale_check_interval_ms: 30_000,
                scale_cooldown_ms: 60_000,
            },
            queue: QueueConfig {
                large_file_threshold_bytes: 52_428_800,
                high_queue_length_threshold: 100,
                backpressure_capacity: 10_000,
                amqp_url: None,
                premium: TierSettings {
                    priority_weight: 100,
                    concurrency_limit: 4,
                    min_workers: 1,
                    max_workers: 8,
                },
                normal: TierSettings {
                    priority_weight: 50,
                    concurrency_limit: 2,
                    min_workers: 1,
                    max_workers: 4,
                },
                large: TierSettings {
                    priority_weight: 20,
                    concurrency_limit: 1,
                    min_workers: 1,
                    max_workers: 2,
                },
            },
            recovery: RecoveryConfig {
                heartbeat_stale_ms: 60_000,
                bootstrap_heartbeat_ms: 30_000,
                max_queued_wait_ms: 3_600_000,
                max_retries: 3,
                backoff_base_ms: 1_000,
                backoff_max_ms: 300_000,
                jitter_factor: 0.1,
                sweep_interval_ms: 30_000,
            },
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 5,
                open_duration_ms: 60_000,
                max_open_duration_ms: 300_000,
                backoff_multiplier: 2.0,
                call_timeout_ms: 30_000,
            },
            worker: WorkerConfig {
                heartbeat_interval_ms: 10_000,
                poll_interval_ms: 500,
                job_timeout_ms: 300_000,
                hostname: None,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "pretty".to_string(),
                audit_database_url: None,
            },
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> OrchestratorResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(OrchestratorError::Configuration(format!(
                    "配置文件不存在: {path}"
                )));
            }
        } else {
            let default_paths = [
                "config/docflow.toml",
                "docflow.toml",
                "/etc/docflow/config.toml",
            ];

            let mut config_file_found = false;
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    config_file_found = true;
                    break;
                }
            }

            if !config_file_found {
                builder = Self::apply_defaults(builder).map_err(|e| {
                    OrchestratorError::Configuration(format!("设置默认配置失败: {e}"))
                })?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DOCFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| OrchestratorError::Configuration(format!("构建配置失败: {e}")))?
            .try_deserialize()
            .map_err(|e| OrchestratorError::Configuration(format!("反序列化配置失败: {e}")))?;

        config.validate()?;

        Ok(config)
    }

    fn apply_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        builder
            .set_default("cluster.min_workers", 1)?
            .set_default("cluster.max_workers", 8)?
            .set_default("cluster.scale_up_threshold", 4.0)?
            .set_default("cluster.scale_down_threshold", 1.0)?
            .set_default("cluster.health_check_interval_ms", 5_000)?
            .set_default("cluster.scale_check_interval_ms", 30_000)?
            .set_default("cluster.scale_cooldown_ms", 60_000)?
            .set_default("queue.large_file_threshold_bytes", 52_428_800)?
            .set_default("queue.high_queue_length_threshold", 100)?
            .set_default("queue.backpressure_capacity", 10_000)?
            .set_default("queue.premium.priority_weight", 100)?
            .set_default("queue.premium.concurrency_limit", 4)?
            .set_default("queue.premium.min_workers", 1)?
            .set_default("queue.premium.max_workers", 8)?
            .set_default("queue.normal.priority_weight", 50)?
            .set_default("queue.normal.concurrency_limit", 2)?
            .set_default("queue.normal.min_workers", 1)?
            .set_default("queue.normal.max_workers", 4)?
            .set_default("queue.large.priority_weight", 20)?
            .set_default("queue.large.concurrency_limit", 1)?
            .set_default("queue.large.min_workers", 1)?
            .set_default("queue.large.max_workers", 2)?
            .set_default("recovery.heartbeat_stale_ms", 60_000)?
            .set_default("recovery.bootstrap_heartbeat_ms", 30_000)?
            .set_default("recovery.max_queued_wait_ms", 3_600_000)?
            .set_default("recovery.max_retries", 3)?
            .set_default("recovery.backoff_base_ms", 1_000)?
            .set_default("recovery.backoff_max_ms", 300_000)?
            .set_default("recovery.jitter_factor", 0.1)?
            .set_default("recovery.sweep_interval_ms", 30_000)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.open_duration_ms", 60_000)?
            .set_default("circuit_breaker.max_open_duration_ms", 300_000)?
            .set_default("circuit_breaker.backoff_multiplier", 2.0)?
            .set_default("circuit_breaker.call_timeout_ms", 30_000)?
            .set_default("worker.heartbeat_interval_ms", 10_000)?
            .set_default("worker.poll_interval_ms", 500)?
            .set_default("worker.job_timeout_ms", 300_000)?
            .set_default("observability.log_level", "info")?
            .set_default("observability.log_format", "pretty")
    }

    pub fn from_toml(toml_str: &str) -> OrchestratorResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| OrchestratorError::Configuration(format!("解析TOML配置失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> OrchestratorResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| OrchestratorError::Configuration(format!("序列化配置为TOML失败: {e}")))
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.cluster.min_workers > self.cluster.max_workers {
            return Err(OrchestratorError::Configuration(
                "cluster.min_workers 不能大于 cluster.max_workers".to_string(),
            ));
        }
        if self.cluster.scale_down_threshold >= self.cluster.scale_up_threshold {
            return Err(OrchestratorError::Configuration(
                "cluster.scale_down_threshold 必须小于 cluster.scale_up_threshold".to_string(),
            ));
        }
        for (name, tier) in [
            ("premium", &self.queue.premium),
            ("normal", &self.queue.normal),
            ("large", &self.queue.large),
        ] {
            if tier.min_workers > tier.max_workers {
                return Err(OrchestratorError::Configuration(format!(
                    "queue.{name}.min_workers 不能大于 max_workers"
                )));
            }
        }
        if self.recovery.backoff_base_ms > self.recovery.backoff_max_ms {
            return Err(OrchestratorError::Configuration(
                "recovery.backoff_base_ms 不能大于 recovery.backoff_max_ms".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.recovery.jitter_factor) {
            return Err(OrchestratorError::Configuration(
                "recovery.jitter_factor 必须位于 [0, 1) 区间".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(OrchestratorError::Configuration(
                "circuit_breaker.failure_threshold 必须大于 0".to_string(),
            ));
        }
        if self.circuit_breaker.backoff_multiplier < 1.0 {
            return Err(OrchestratorError::Configuration(
                "circuit_breaker.backoff_multiplier 不能小于 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.cluster.min_workers, 1);
        assert_eq!(config.cluster.max_workers, 8);
        assert_eq!(config.queue.large_file_threshold_bytes, 52_428_800);
        assert_eq!(config.recovery.max_retries, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_serialization() {
        let config = AppConfig::default();
        let serialized = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: AppConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize");

        assert_eq!(config.cluster.max_workers, deserialized.cluster.max_workers);
        assert_eq!(
            config.recovery.backoff_base_ms,
            deserialized.recovery.backoff_base_ms
        );
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = AppConfig::default().to_toml().expect("to_toml failed");
        let config = AppConfig::from_toml(&toml_str).expect("from_toml failed");
        assert_eq!(config.worker.poll_interval_ms, 500);
        assert_eq!(config.queue.premium.priority_weight, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        let toml_str = AppConfig::default().to_toml().expect("to_toml failed");
        file.write_all(toml_str.as_bytes()).expect("write config");

        let path = file.path().to_str().expect("temp path utf-8");
        let config = AppConfig::load(Some(path)).expect("load failed");
        assert_eq!(config.cluster.health_check_interval_ms, 5_000);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = AppConfig::load(Some("/nonexistent/docflow.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file_value() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        let toml_str = AppConfig::default().to_toml().expect("to_toml failed");
        file.write_all(toml_str.as_bytes()).expect("write config");

        std::env::set_var("DOCFLOW_CLUSTER__MAX_WORKERS", "16");
        let path = file.path().to_str().expect("temp path utf-8");
        let result = AppConfig::load(Some(path));
        std::env::remove_var("DOCFLOW_CLUSTER__MAX_WORKERS");

        let config = result.expect("load failed");
        assert_eq!(config.cluster.max_workers, 16);
    }

    #[test]
    fn test_validate_rejects_inverted_worker_bounds() {
        let mut config = AppConfig::default();
        config.cluster.min_workers = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = AppConfig::default();
        config.recovery.backoff_base_ms = 600_000;
        assert!(config.validate().is_err());
    }
}
