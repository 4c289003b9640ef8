use async_trait::async_trait;
use tracing::{error, info, warn};

use docflow_core::OrchestratorResult;
use docflow_domain::events::{Alert, AlertSeverity, JobEvent};
use docflow_domain::messaging::NotificationSink;

/// 通知下沉的日志实现
///
/// 未接入外部通知通道时，把作业事件与告警写入结构化日志。
#[derive(Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn publish_job_event(&self, event: &JobEvent) -> OrchestratorResult<()> {
        info!(
            job_id = event.job_id(),
            event_type = event.event_type(),
            "作业事件"
        );
        Ok(())
    }

    async fn publish_alert(&self, alert: &Alert) -> OrchestratorResult<()> {
        match alert.severity {
            AlertSeverity::Critical => error!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => warn!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                "{}",
                alert.message
            ),
            AlertSeverity::Info => info!(
                alert_id = %alert.id,
                alert_type = alert.alert_type.as_str(),
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}
