#[cfg(test)]
pub mod mocks {
    // 共享mock与构造器统一从testing-utils取
    pub use docflow_testing_utils::{
        CapturingNotificationSink, JobBuilder, MockAuditStore, MockJobRepository, MockQueueBroker,
        MockWorkerLauncher, MockWorkerRepository, WorkerRecordBuilder,
    };

    use docflow_core::AppConfig;

    /// 默认配置加固定主机名，避免测试环境读取真实hostname
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.worker.hostname = Some("test-host".to_string());
        config
    }
}
