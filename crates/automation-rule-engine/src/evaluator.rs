//! 条件评估器
//!
//! 按顺序左折叠规则条件：累加器从 `true` 开始，`OR` 条件做或运算，
//! 其余一律做与运算，没有优先级分组。比较语义与前端/脚本侧保持一致
//! （严格相等、字符串化后的子串匹配、数值强制转换后的大小比较）。
//!
//! 评估器从不因数据形状问题报错：无法识别的操作符结果为 `false`，
//! 并作为 [`EvaluationAnomaly`] 交给调用方记录。

use crate::models::{Condition, Record};
use crate::operators::{ConditionOperator, LogicalOperator};
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// 条件评估器
pub struct ConditionEvaluator;

/// 单个条件的评估记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionTrace {
    pub index: usize,
    pub field: String,
    pub operator: String,
    pub logical_operator: LogicalOperator,
    pub result: bool,
    /// 合并本条件之后的累加值
    pub met_after: bool,
}

impl fmt::Display for ConditionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conditions[{}]: {} {} {} => {} (met={})",
            self.index, self.logical_operator, self.field, self.operator, self.result, self.met_after
        )
    }
}

/// 评估过程中遇到的数据漂移，不中断评估但需要记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationAnomaly {
    UnknownOperator {
        index: usize,
        field: String,
        operator: String,
    },
    UnknownActionType {
        index: usize,
        action_type: String,
    },
}

impl EvaluationAnomaly {
    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownOperator { .. } => "unknown_operator",
            Self::UnknownActionType { .. } => "unknown_action_type",
        }
    }
}

impl fmt::Display for EvaluationAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOperator {
                index,
                field,
                operator,
            } => write!(
                f,
                "conditions[{}] uses unknown operator '{}' on field '{}'",
                index, operator, field
            ),
            Self::UnknownActionType { index, action_type } => {
                write!(f, "actions[{}] has unknown action type '{}'", index, action_type)
            }
        }
    }
}

/// 带追踪的评估结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionsVerdict {
    pub met: bool,
    pub trace: Vec<ConditionTrace>,
    pub anomalies: Vec<EvaluationAnomaly>,
}

impl ConditionEvaluator {
    /// 评估条件列表，空列表恒为 `true`
    pub fn evaluate(conditions: &[Condition], record: &Record) -> bool {
        conditions.iter().fold(true, |met, condition| {
            let result = Self::evaluate_condition(condition, record.get(&condition.field));
            Self::combine(met, result, condition.logical_operator)
        })
    }

    /// 评估条件列表并保留每一步的结果和异常
    pub fn evaluate_traced(conditions: &[Condition], record: &Record) -> ConditionsVerdict {
        let mut verdict = ConditionsVerdict {
            met: true,
            ..Default::default()
        };

        for (index, condition) in conditions.iter().enumerate() {
            if let ConditionOperator::Unknown(raw) = &condition.operator {
                verdict.anomalies.push(EvaluationAnomaly::UnknownOperator {
                    index,
                    field: condition.field.clone(),
                    operator: raw.clone(),
                });
            }

            let result = Self::evaluate_condition(condition, record.get(&condition.field));
            verdict.met = Self::combine(verdict.met, result, condition.logical_operator);

            verdict.trace.push(ConditionTrace {
                index,
                field: condition.field.clone(),
                operator: condition.operator.to_string(),
                logical_operator: condition.logical_operator,
                result,
                met_after: verdict.met,
            });
        }

        verdict
    }

    /// 评估单个条件
    ///
    /// `field_value` 为 `None` 表示记录中没有该键，与 `Some(Value::Null)` 不同。
    pub fn evaluate_condition(condition: &Condition, field_value: Option<&Value>) -> bool {
        let Some(field) = field_value else {
            return condition.operator == ConditionOperator::NotExists;
        };
        let expected = &condition.value;

        match &condition.operator {
            ConditionOperator::Equals => strict_equals(field, expected),
            ConditionOperator::NotEquals => !strict_equals(field, expected),
            ConditionOperator::Contains => match field {
                Value::String(s) => s.contains(&js_string(expected)),
                _ => false,
            },
            // 非字符串字段返回 false 而不是 true，与 contains 并不对称
            ConditionOperator::NotContains => match field {
                Value::String(s) => !s.contains(&js_string(expected)),
                _ => false,
            },
            ConditionOperator::GreaterThan => {
                compare(field, expected).is_some_and(|o| o == Ordering::Greater)
            }
            ConditionOperator::LessThan => {
                compare(field, expected).is_some_and(|o| o == Ordering::Less)
            }
            ConditionOperator::In => match expected {
                Value::Array(items) => items.iter().any(|item| strict_equals(field, item)),
                _ => false,
            },
            ConditionOperator::NotIn => match expected {
                Value::Array(items) => !items.iter().any(|item| strict_equals(field, item)),
                _ => false,
            },
            ConditionOperator::Exists => !field.is_null(),
            ConditionOperator::NotExists => field.is_null(),
            ConditionOperator::Unknown(_) => false,
        }
    }

    fn combine(met: bool, result: bool, logical_operator: LogicalOperator) -> bool {
        match logical_operator {
            LogicalOperator::Or => met || result,
            LogicalOperator::And => met && result,
        }
    }
}

/// 严格相等：同类型按值比较，数组与对象之间永不相等
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        },
        _ => false,
    }
}

/// 大小比较：数组与对象先取字符串形式；两个字符串按字典序，其余按数值强制转换后比较
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let a = to_primitive(a);
    let b = to_primitive(b);
    if let (Value::String(x), Value::String(y)) = (a.as_ref(), b.as_ref()) {
        return Some(x.cmp(y));
    }
    let x = to_number(&a)?;
    let y = to_number(&b)?;
    x.partial_cmp(&y)
}

fn to_primitive(value: &Value) -> Cow<'_, Value> {
    match value {
        Value::Array(_) | Value::Object(_) => Cow::Owned(Value::String(js_string(value))),
        _ => Cow::Borrowed(value),
    }
}

/// 数值强制转换，无法转换（NaN）时返回 `None`
fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_string(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }

    match trimmed {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }

    // Rust 的解析接受 inf/nan 等拼写，这里只放行纯数字形式
    if trimmed
        .chars()
        .any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E'))
    {
        return None;
    }

    trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// 值的字符串形式（数组以逗号连接，对象为 `[object Object]`）
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (_, Some(u), _) => u.to_string(),
            (_, _, Some(f)) => format_float(f),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f == 0.0 {
        "0".to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{:.0}", f)
    } else {
        f.to_string()
    }
}
