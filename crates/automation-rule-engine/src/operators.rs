//! 条件操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

string_enum! {
    /// 条件操作符
    pub enum ConditionOperator {
        Equals => "equals",
        NotEquals => "not_equals",
        Contains => "contains",
        NotContains => "not_contains",
        GreaterThan => "greater_than",
        LessThan => "less_than",
        In => "in",
        NotIn => "not_in",
        Exists => "exists",
        NotExists => "not_exists",
    }
}

/// 条件之间的连接方式
///
/// 只有字面量 `OR` 会被识别为或，其他取值（包括缺省）一律按 `AND` 处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl From<String> for LogicalOperator {
    fn from(s: String) -> Self {
        if s == "OR" { Self::Or } else { Self::And }
    }
}

impl From<LogicalOperator> for String {
    fn from(op: LogicalOperator) -> Self {
        op.to_string()
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}
