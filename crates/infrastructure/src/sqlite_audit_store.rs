use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use docflow_core::{OrchestratorError, OrchestratorResult};
use docflow_domain::entities::FailureRecord;
use docflow_domain::events::{Alert, AlertSeverity, AlertType};
use docflow_domain::repositories::AuditStore;

fn db_err(e: sqlx::Error) -> OrchestratorError {
    OrchestratorError::Store(format!("数据库操作失败: {e}"))
}

/// SQLite审计存储
///
/// 嵌入式部署下持久化故障记录与告警，表结构在连接时自动建立。
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// 连接指定数据库并初始化表结构
    ///
    /// 审计写入是低频追加，单连接池即可；`:memory:`地址在多连接
    /// 池下每个连接各有一份库，单连接也顺带规避了这一点。
    pub async fn connect(database_url: &str) -> OrchestratorResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| OrchestratorError::Store(format!("解析SQLite地址失败: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| OrchestratorError::Store(format!("连接SQLite失败: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// 内存数据库，进程退出即丢弃
    pub async fn in_memory() -> OrchestratorResult<Self> {
        Self::connect(":memory:").await
    }

    async fn init_schema(&self) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS failure_records (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                worker_id TEXT,
                reason TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                failed_at DATETIME NOT NULL,
                recovery_attempted INTEGER NOT NULL DEFAULT 0,
                recovery_succeeded INTEGER NOT NULL DEFAULT 0,
                recovered_at DATETIME
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_failure_records_job_id ON failure_records(job_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                metadata TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("审计表结构初始化完成");
        Ok(())
    }

    fn row_to_failure(row: &sqlx::sqlite::SqliteRow) -> Result<FailureRecord, sqlx::Error> {
        Ok(FailureRecord {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            worker_id: row.try_get("worker_id")?,
            reason: row.try_get("reason")?,
            retry_count: row.try_get::<i64, _>("retry_count")? as u32,
            failed_at: row.try_get("failed_at")?,
            recovery_attempted: row.try_get("recovery_attempted")?,
            recovery_succeeded: row.try_get("recovery_succeeded")?,
            recovered_at: row.try_get("recovered_at")?,
        })
    }

    fn row_to_alert(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Alert> {
        let alert_type: String = row.try_get("alert_type").map_err(db_err)?;
        let severity: String = row.try_get("severity").map_err(db_err)?;
        let metadata: String = row.try_get("metadata").map_err(db_err)?;

        Ok(Alert {
            id: row.try_get("id").map_err(db_err)?,
            alert_type: alert_type.parse::<AlertType>()?,
            severity: severity.parse::<AlertSeverity>()?,
            message: row.try_get("message").map_err(db_err)?,
            metadata: serde_json::from_str(&metadata)
                .map_err(|e| OrchestratorError::Serialization(format!("解析告警元数据失败: {e}")))?,
            created_at: row.try_get("created_at").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn record_failure(&self, record: &FailureRecord) -> OrchestratorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO failure_records
                (id, job_id, worker_id, reason, retry_count, failed_at,
                 recovery_attempted, recovery_succeeded, recovered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.job_id)
        .bind(&record.worker_id)
        .bind(&record.reason)
        .bind(record.retry_count as i64)
        .bind(record.failed_at)
        .bind(record.recovery_attempted)
        .bind(record.recovery_succeeded)
        .bind(record.recovered_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("故障记录已写入: {} (作业: {})", record.id, record.job_id);
        Ok(())
    }

    async fn record_recovery_outcome(
        &self,
        record_id: &str,
        succeeded: bool,
        at: DateTime<Utc>,
    ) -> OrchestratorResult<()> {
        // 只接受首次回写
        let result = sqlx::query(
            r#"
            UPDATE failure_records
            SET recovery_attempted = 1, recovery_succeeded = $2, recovered_at = $3
            WHERE id = $1 AND recovery_attempted = 0
            "#,
        )
        .bind(record_id)
        .bind(succeeded)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT id FROM failure_records WHERE id = $1")
                .bind(record_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

            if exists.is_none() {
                return Err(OrchestratorError::Store(format!(
                    "恢复记录 {record_id} 不存在"
                )));
            }
            debug!("恢复记录 {} 已有结果，忽略重复回写", record_id);
        }
        Ok(())
    }

    async fn record_alert(&self, alert: &Alert) -> OrchestratorResult<()> {
        let metadata = serde_json::to_string(&alert.metadata)
            .map_err(|e| OrchestratorError::Serialization(format!("序列化告警元数据失败: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO alerts (id, alert_type, severity, message, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&alert.id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(metadata)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!("告警已写入: {} ({})", alert.id, alert.alert_type.as_str());
        Ok(())
    }

    async fn list_failures_for_job(&self, job_id: &str) -> OrchestratorResult<Vec<FailureRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, worker_id, reason, retry_count, failed_at,
                   recovery_attempted, recovery_succeeded, recovered_at
            FROM failure_records WHERE job_id = $1 ORDER BY failed_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(Self::row_to_failure)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    async fn recent_alerts(&self, limit: usize) -> OrchestratorResult<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, alert_type, severity, message, metadata, created_at
            FROM alerts ORDER BY created_at DESC LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::row_to_alert).collect()
    }
}
