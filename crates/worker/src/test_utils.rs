#[cfg(test)]
pub mod mocks {
    use async_trait::async_trait;

    use docflow_core::{OrchestratorError, OrchestratorResult};
    use docflow_domain::JobMessage;
    pub use docflow_testing_utils::{JobBuilder, MockQueueBroker};

    use crate::extractor::{DocumentExtractor, ExtractionOutput, ExtractionRequest};

    /// 默认构建器产出的Normal层作业对应的队列消息
    pub fn message_for(job_id: &str) -> JobMessage {
        JobMessage::from_job(&JobBuilder::new(job_id).build())
    }

    /// 总是以指定原因失败的提取器
    pub struct FailingExtractor {
        reason: String,
    }

    impl FailingExtractor {
        pub fn new(reason: impl Into<String>) -> Self {
            Self {
                reason: reason.into(),
            }
        }
    }

    #[async_trait]
    impl DocumentExtractor for FailingExtractor {
        async fn extract(
            &self,
            _request: &ExtractionRequest,
        ) -> OrchestratorResult<ExtractionOutput> {
            Err(OrchestratorError::DependencyFailure(self.reason.clone()))
        }
    }

    /// 永不返回的提取器，用来走超时路径
    pub struct HangingExtractor;

    #[async_trait]
    impl DocumentExtractor for HangingExtractor {
        async fn extract(
            &self,
            _request: &ExtractionRequest,
        ) -> OrchestratorResult<ExtractionOutput> {
            std::future::pending().await
        }
    }
}
