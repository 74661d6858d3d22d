//! 活动日志模型
//!
//! 规则生命周期事件落库后的审计记录

use chrono::{DateTime, Utc};
use rule_engine::RuleEvent;
use serde::Serialize;
use uuid::Uuid;

/// 活动日志实体
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: Uuid,
    /// 实体类型，规则事件固定为 `automation_rule`
    pub entity_type: String,
    pub entity_id: Uuid,
    /// 动作名，如 `automation_rule_executed`
    pub action: String,
    pub description: String,
    /// 事件原文
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    pub const ENTITY_AUTOMATION_RULE: &'static str = "automation_rule";

    pub fn new(
        entity_id: Uuid,
        action: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: Self::ENTITY_AUTOMATION_RULE.to_string(),
            entity_id,
            action: action.into(),
            description: description.into(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// 由规则事件构建日志
    pub fn from_event(event: &RuleEvent) -> Self {
        let metadata = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        Self::new(event.rule_id(), event.action(), event.describe()).with_metadata(metadata)
    }
}
