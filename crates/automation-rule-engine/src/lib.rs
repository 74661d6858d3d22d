//! 自动化规则引擎
//!
//! CRM 自动化规则的核心能力：
//! - 条件评估（按顺序左折叠 AND/OR）
//! - 动作选择（过滤禁用动作，按 order 稳定排序）
//! - 规则结构校验
//! - 执行统计
//! - 试运行与动作派发

#[macro_use]
mod macros;

pub mod analytics;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod executor;
pub mod models;
pub mod operators;
pub mod selector;
pub mod validator;

pub use analytics::{ExecutionOutcome, RuleAnalytics, record_execution};
pub use dispatch::{ActionDispatcher, ExecutionTarget, LoggingDispatcher};
pub use error::{Result, RuleError};
pub use evaluator::{ConditionEvaluator, ConditionsVerdict, EvaluationAnomaly};
pub use events::{RuleEvent, RuleEventSink, TracingEventSink};
pub use executor::{DispatchSummary, RuleEvaluation, RuleExecutor, TestReport};
pub use models::{
    Action, ActionType, AutomationRule, Condition, ExecutionConfig, Record, RuleInput, RuleType,
    Trigger, TriggerEventType,
};
pub use operators::{ConditionOperator, LogicalOperator};
pub use selector::{ActionSelector, SelectedAction};
pub use validator::{FieldError, RuleValidator, ValidationErrors, ValidationMode};
