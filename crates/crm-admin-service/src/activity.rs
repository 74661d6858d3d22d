//! 规则事件落地
//!
//! PostgreSQL 模式下事件写入 activity_logs 表，内存模式下保存在进程内，
//! 两者都同时输出结构化日志。

use async_trait::async_trait;
use parking_lot::Mutex;
use rule_engine::{RuleError, RuleEvent, RuleEventSink, TracingEventSink};
use sqlx::PgPool;

use crate::models::ActivityLog;

/// 写入 activity_logs 表的事件接收方
pub struct ActivityLogSink {
    pool: PgPool,
}

impl ActivityLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleEventSink for ActivityLogSink {
    async fn publish(&self, event: &RuleEvent) -> rule_engine::Result<()> {
        TracingEventSink.publish(event).await?;

        let log = ActivityLog::from_event(event);
        sqlx::query(
            r#"
            INSERT INTO activity_logs (id, entity_type, entity_id, action, description, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id)
        .bind(&log.entity_type)
        .bind(log.entity_id)
        .bind(&log.action)
        .bind(&log.description)
        .bind(&log.metadata)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RuleError::EventSink(e.to_string()))?;

        Ok(())
    }
}

/// 进程内活动日志
#[derive(Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityLog>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有日志（按写入顺序）
    pub fn entries(&self) -> Vec<ActivityLog> {
        self.entries.lock().clone()
    }

    /// 指定规则的日志动作名
    pub fn actions_for(&self, rule_id: uuid::Uuid) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|log| log.entity_id == rule_id)
            .map(|log| log.action.clone())
            .collect()
    }
}

#[async_trait]
impl RuleEventSink for MemoryActivityLog {
    async fn publish(&self, event: &RuleEvent) -> rule_engine::Result<()> {
        TracingEventSink.publish(event).await?;
        self.entries.lock().push(ActivityLog::from_event(event));
        Ok(())
    }
}
