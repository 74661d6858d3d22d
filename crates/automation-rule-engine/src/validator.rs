//! 规则结构校验
//!
//! 在创建和更新规则前检查规则定义。不同顶层字段的错误会合并返回，
//! 同一个列表（conditions / actions）内遇到第一个错误即停止，
//! 每个列表最多一条错误。

use crate::error::{Result, RuleError};
use crate::models::{Action, ActionType, Condition, ExecutionConfig, RuleInput, Trigger, TriggerEventType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 允许的最大重试次数
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// 字段级校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// 字段路径，如 `actions[1].actionData`
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// 校验错误集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

/// 校验模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// 创建：trigger 与 actions 必填
    Create,
    /// 更新：只校验提供了的字段
    Update,
}

pub struct RuleValidator;

impl RuleValidator {
    /// 校验规则定义，返回空列表表示通过
    pub fn validate(input: &RuleInput, mode: ValidationMode) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if let Some(rule_type) = &input.rule_type
            && !rule_type.is_known()
        {
            errors.push(FieldError::new(
                "ruleType",
                format!("unsupported rule type '{}'", rule_type),
            ));
        }

        match (&input.trigger, mode) {
            (Some(trigger), _) => errors.extend(Self::validate_trigger(trigger)),
            (None, ValidationMode::Create) => {
                errors.push(FieldError::new("trigger", "trigger is required"));
            }
            (None, ValidationMode::Update) => {}
        }

        if let Some(conditions) = &input.conditions {
            errors.extend(Self::validate_conditions(conditions));
        }

        match (&input.actions, mode) {
            (Some(actions), ValidationMode::Create) if actions.is_empty() => {
                errors.push(FieldError::new("actions", "at least one action is required"));
            }
            (Some(actions), _) => errors.extend(Self::validate_actions(actions)),
            (None, ValidationMode::Create) => {
                errors.push(FieldError::new("actions", "at least one action is required"));
            }
            (None, ValidationMode::Update) => {}
        }

        if let Some(config) = &input.execution_config {
            errors.extend(Self::validate_execution_config(config));
        }

        errors
    }

    /// 校验并在失败时返回 [`RuleError::Validation`]
    pub fn check(input: &RuleInput, mode: ValidationMode) -> Result<()> {
        let errors = Self::validate(input, mode);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RuleError::Validation(ValidationErrors(errors)))
        }
    }

    fn validate_trigger(trigger: &Trigger) -> Option<FieldError> {
        if !trigger.event_type.is_known() {
            return Some(FieldError::new(
                "trigger.eventType",
                format!("unsupported trigger event type '{}'", trigger.event_type),
            ));
        }

        let has_schedule = trigger
            .schedule
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if trigger.event_type == TriggerEventType::Scheduled && !has_schedule {
            return Some(FieldError::new(
                "trigger.schedule",
                "schedule is required for scheduled triggers",
            ));
        }

        None
    }

    fn validate_conditions(conditions: &[Condition]) -> Option<FieldError> {
        conditions
            .iter()
            .enumerate()
            .find_map(|(i, condition)| {
                if condition.field.trim().is_empty() {
                    Some(FieldError::new(
                        format!("conditions[{}].field", i),
                        "field is required",
                    ))
                } else if !condition.operator.is_known() {
                    Some(FieldError::new(
                        format!("conditions[{}].operator", i),
                        format!("unsupported operator '{}'", condition.operator),
                    ))
                } else {
                    None
                }
            })
    }

    fn validate_actions(actions: &[Action]) -> Option<FieldError> {
        actions
            .iter()
            .enumerate()
            .find_map(|(i, action)| Self::validate_action(i, action))
    }

    fn validate_action(index: usize, action: &Action) -> Option<FieldError> {
        if !action.action_type.is_dispatchable() {
            return Some(FieldError::new(
                format!("actions[{}].actionType", index),
                format!("unsupported action type '{}'", action.action_type),
            ));
        }

        let data_field = format!("actions[{}].actionData", index);
        let Value::Object(data) = &action.action_data else {
            return Some(FieldError::new(data_field, "actionData must be an object"));
        };

        let missing = match action.action_type {
            ActionType::UpdateStatus => require_all(data, &["status_id"]),
            ActionType::AssignToUser => require_any(data, &["user_id", "team_id", "rule_id"]),
            ActionType::UpdateField => {
                // value 允许为假值，只要求键存在
                require_all(data, &["field"]).or_else(|| {
                    (!data.contains_key("value")).then(|| "requires value".to_string())
                })
            }
            ActionType::SendNotification | ActionType::SendSms => {
                require_any(data, &["template_id", "message"])
            }
            ActionType::SendEmail => require_any(data, &["template_id", "subject"]),
            ActionType::CreateTask => require_all(data, &["title", "due_date"]),
            ActionType::Webhook => require_all(data, &["url", "method"]),
            _ => None,
        };

        missing.map(|message| {
            FieldError::new(data_field, format!("{} {}", action.action_type, message))
        })
    }

    fn validate_execution_config(config: &ExecutionConfig) -> Option<FieldError> {
        if config.max_retries > MAX_RETRIES_LIMIT {
            return Some(FieldError::new(
                "executionConfig.maxRetries",
                format!("maxRetries must not exceed {}", MAX_RETRIES_LIMIT),
            ));
        }
        if config.timeout_seconds == 0 {
            return Some(FieldError::new(
                "executionConfig.timeoutSeconds",
                "timeoutSeconds must be at least 1",
            ));
        }
        None
    }
}

fn require_all(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|key| !is_truthy(data.get(*key)))
        .collect();

    (!missing.is_empty()).then(|| format!("requires {}", missing.join(" and ")))
}

fn require_any(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    let satisfied = keys.iter().any(|key| is_truthy(data.get(*key)));
    (!satisfied).then(|| format!("requires one of {}", keys.join(", ")))
}

/// 真值判断：缺失、null、false、0、空字符串为假
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
