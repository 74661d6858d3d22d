//! 自动化规则领域模型
//!
//! 规则文档以 camelCase JSON 持久化和传输。枚举字段按字符串解析，
//! 无法识别的取值保留为 `Unknown`，交给校验器或评估器各自处理。

use crate::analytics::RuleAnalytics;
use crate::operators::{ConditionOperator, LogicalOperator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 被评估的记录：字段名到任意 JSON 值的映射
///
/// 键不存在（`None`）与值为 `null` 是两种不同状态。
pub type Record = serde_json::Map<String, Value>;

string_enum! {
    /// 规则类型
    pub enum RuleType {
        StatusChange => "status_change",
        Assignment => "assignment",
        Notification => "notification",
        TaskCreation => "task_creation",
        LeadScoring => "lead_scoring",
        DataEnrichment => "data_enrichment",
    }
}

string_enum! {
    /// 触发事件类型
    pub enum TriggerEventType {
        RecordCreated => "record_created",
        RecordUpdated => "record_updated",
        StatusChanged => "status_changed",
        FieldChanged => "field_changed",
        Assigned => "assigned",
        Scheduled => "scheduled",
        Manual => "manual",
    }
}

string_enum! {
    /// 动作类型
    pub enum ActionType {
        UpdateStatus => "update_status",
        AssignToUser => "assign_to_user",
        UpdateField => "update_field",
        SendNotification => "send_notification",
        SendEmail => "send_email",
        SendSms => "send_sms",
        CreateTask => "create_task",
        Webhook => "webhook",
        /// 仅存在于持久化模型，评估器不处理
        UpdateStage => "update_stage",
        /// 仅存在于持久化模型，评估器不处理
        UpdatePriority => "update_priority",
        /// 仅存在于持久化模型，评估器不处理
        SendWhatsapp => "send_whatsapp",
    }
}

impl ActionType {
    /// 是否为可派发的动作类型（校验器只接受这些）
    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self,
            Self::UpdateStatus
                | Self::AssignToUser
                | Self::UpdateField
                | Self::SendNotification
                | Self::SendEmail
                | Self::SendSms
                | Self::CreateTask
                | Self::Webhook
        )
    }
}

/// 触发器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(default)]
    pub event_type: TriggerEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_event: Option<String>,
    /// cron 风格表达式，仅 `scheduled` 触发器需要
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

impl Trigger {
    pub fn new(event_type: TriggerEventType) -> Self {
        Self {
            event_type,
            specific_event: None,
            schedule: None,
        }
    }

    pub fn scheduled(schedule: impl Into<String>) -> Self {
        Self {
            schedule: Some(schedule.into()),
            ..Self::new(TriggerEventType::Scheduled)
        }
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(TriggerEventType::Manual)
    }
}

/// 条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            logical_operator: LogicalOperator::And,
        }
    }

    /// 以 OR 方式与前面的结果合并
    pub fn or(mut self) -> Self {
        self.logical_operator = LogicalOperator::Or;
        self
    }
}

/// 动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub action_data: Value,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub order: i32,
    #[serde(default = "default_enabled", deserialize_with = "null_as_enabled")]
    pub enabled: bool,
}

impl Action {
    pub fn new(action_type: ActionType, action_data: Value) -> Self {
        Self {
            action_type,
            action_data,
            order: 0,
            enabled: true,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_enabled() -> bool {
    true
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or(0))
}

/// `enabled: null` 与缺省同义，视为启用
fn null_as_enabled<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

/// 执行配置
///
/// 仅为调用方提供的元数据，评估器本身不负责重试与超时。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionConfig {
    pub max_retries: u32,
    pub retry_delay_minutes: u32,
    pub timeout_seconds: u32,
    pub stop_on_error: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_minutes: 5,
            timeout_seconds: 30,
            stop_on_error: false,
        }
    }
}

/// 规则定义输入（创建与更新共用）
///
/// 所有字段均可缺省，由 [`crate::validator::RuleValidator`] 按模式判断是否必填。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<RuleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_config: Option<ExecutionConfig>,
}

/// 自动化规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub rule_type: Option<RuleType>,
    #[serde(default)]
    pub priority: i32,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub execution_config: ExecutionConfig,
    #[serde(default)]
    pub analytics: RuleAnalytics,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl AutomationRule {
    /// 创建一条启用状态的规则
    pub fn new(
        name: impl Into<String>,
        trigger: Trigger,
        conditions: Vec<Condition>,
        actions: Vec<Action>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            is_active: true,
            rule_type: None,
            priority: 0,
            trigger,
            conditions,
            actions,
            execution_config: ExecutionConfig::default(),
            analytics: RuleAnalytics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 由已通过创建校验的输入构建规则
    pub fn from_input(name: impl Into<String>, input: RuleInput) -> Self {
        let mut rule = Self::new(
            name,
            input.trigger.unwrap_or_default(),
            input.conditions.unwrap_or_default(),
            input.actions.unwrap_or_default(),
        );
        rule.rule_type = input.rule_type;
        rule.execution_config = input.execution_config.unwrap_or_default();
        rule
    }

    /// 合并更新输入，返回触发器、条件或动作是否发生变化
    pub fn apply_input(&mut self, input: RuleInput) -> bool {
        let mut definition_changed = false;

        if let Some(rule_type) = input.rule_type {
            self.rule_type = Some(rule_type);
        }
        if let Some(trigger) = input.trigger {
            definition_changed |= trigger != self.trigger;
            self.trigger = trigger;
        }
        if let Some(conditions) = input.conditions {
            definition_changed |= conditions != self.conditions;
            self.conditions = conditions;
        }
        if let Some(actions) = input.actions {
            definition_changed |= actions != self.actions;
            self.actions = actions;
        }
        if let Some(execution_config) = input.execution_config {
            self.execution_config = execution_config;
        }

        self.updated_at = Utc::now();
        definition_changed
    }

    /// 规则类型标签（用于指标和统计）
    pub fn rule_type_label(&self) -> &str {
        self.rule_type
            .as_ref()
            .map(RuleType::as_str)
            .unwrap_or("unspecified")
    }
}
