//! 规则执行器
//!
//! 组合条件评估和动作选择，提供试运行（不影响统计）和执行派发两条路径。

use crate::analytics::ExecutionOutcome;
use crate::dispatch::{ActionDispatcher, ExecutionTarget};
use crate::error::{Result, RuleError};
use crate::evaluator::{ConditionEvaluator, ConditionsVerdict, EvaluationAnomaly};
use crate::models::{AutomationRule, Record};
use crate::selector::{ActionSelector, SelectedAction};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// 规则评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleEvaluation {
    pub verdict: ConditionsVerdict,
    pub actions: Vec<SelectedAction>,
}

impl RuleEvaluation {
    pub fn conditions_met(&self) -> bool {
        self.verdict.met
    }
}

/// 试运行报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub rule_id: Uuid,
    pub name: String,
    pub conditions_met: bool,
    pub actions_to_execute: Vec<SelectedAction>,
    pub test_data: Record,
    #[serde(skip)]
    pub anomalies: Vec<EvaluationAnomaly>,
}

/// 动作派发汇总
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub outcome: ExecutionOutcome,
}

/// 规则执行器
#[derive(Debug, Clone, Default)]
pub struct RuleExecutor {
    /// 是否保留逐条条件的评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 评估规则：条件判定 + 动作选择，纯函数
    pub fn evaluate(&self, rule: &AutomationRule, record: &Record) -> RuleEvaluation {
        let mut verdict = ConditionEvaluator::evaluate_traced(&rule.conditions, record);
        let actions = ActionSelector::select(&rule.actions, verdict.met);

        if verdict.met {
            verdict.anomalies.extend(
                rule.actions
                    .iter()
                    .enumerate()
                    .filter(|(_, action)| action.enabled && !action.action_type.is_known())
                    .map(|(index, action)| EvaluationAnomaly::UnknownActionType {
                        index,
                        action_type: action.action_type.to_string(),
                    }),
            );
        }

        if self.trace_enabled {
            for step in &verdict.trace {
                debug!(rule_id = %rule.id, "{}", step);
            }
        } else {
            verdict.trace.clear();
        }

        RuleEvaluation { verdict, actions }
    }

    /// 试运行：对给定数据评估规则，不修改规则和统计
    ///
    /// 未启用的规则同样可以试运行。
    pub fn test(&self, rule: &AutomationRule, test_data: Record) -> TestReport {
        let evaluation = self.evaluate(rule, &test_data);

        TestReport {
            rule_id: rule.id,
            name: rule.name.clone(),
            conditions_met: evaluation.verdict.met,
            actions_to_execute: evaluation.actions,
            test_data,
            anomalies: evaluation.verdict.anomalies,
        }
    }

    /// 执行前置检查：规则必须处于启用状态
    pub fn ensure_executable(rule: &AutomationRule) -> Result<()> {
        if rule.is_active {
            Ok(())
        } else {
            Err(RuleError::InactiveRule(rule.id.to_string()))
        }
    }

    /// 按顺序派发动作
    ///
    /// `stop_on_error` 为真时遇到第一个失败即停止；失败描述以 `; ` 连接。
    pub async fn dispatch_all(
        dispatcher: &dyn ActionDispatcher,
        rule: &AutomationRule,
        actions: &[SelectedAction],
        target: &ExecutionTarget,
    ) -> DispatchSummary {
        let mut attempted = 0;
        let mut errors = Vec::new();

        for action in actions {
            attempted += 1;
            if let Err(e) = dispatcher.dispatch(rule, action, target).await {
                warn!(
                    rule_id = %rule.id,
                    action_type = %action.action_type,
                    error = %e,
                    "Automation action failed"
                );
                errors.push(format!("{}: {}", action.action_type, e));
                if rule.execution_config.stop_on_error {
                    break;
                }
            }
        }

        let succeeded = attempted - errors.len();
        let outcome = if errors.is_empty() {
            ExecutionOutcome::Success
        } else {
            ExecutionOutcome::Failure(errors.join("; "))
        };

        DispatchSummary {
            attempted,
            succeeded,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, ActionType, Condition, Trigger};
    use crate::operators::ConditionOperator;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    fn sample_rule() -> AutomationRule {
        AutomationRule::new(
            "open lead follow-up",
            Trigger::default(),
            vec![Condition::new("status", ConditionOperator::Equals, "open")],
            vec![
                Action::new(ActionType::SendEmail, json!({"subject": "hi"})).with_order(0),
                Action::new(
                    ActionType::CreateTask,
                    json!({"title": "t", "due_date": "2025-01-01"}),
                )
                .with_order(-1),
            ],
        )
    }

    /// 记录调用顺序，指定类型返回失败
    struct RecordingDispatcher {
        calls: Mutex<Vec<String>>,
        failing: Vec<ActionType>,
    }

    #[async_trait]
    impl ActionDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            _rule: &AutomationRule,
            action: &SelectedAction,
            _target: &ExecutionTarget,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(action.action_type.to_string());
            if self.failing.contains(&action.action_type) {
                return Err(RuleError::dispatch(action.action_type.as_str(), "unreachable"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_dry_run_orders_actions() {
        let rule = sample_rule();
        let report = RuleExecutor::new().test(&rule, record(json!({"status": "open"})));

        assert!(report.conditions_met);
        let types: Vec<&str> = report
            .actions_to_execute
            .iter()
            .map(|a| a.action_type.as_str())
            .collect();
        assert_eq!(types, vec!["create_task", "send_email"]);
        assert_eq!(report.test_data, record(json!({"status": "open"})));
        assert_eq!(rule.analytics.total_executions, 0);
    }

    #[test]
    fn test_report_wire_format() {
        let rule = sample_rule();
        let report = RuleExecutor::new().test(&rule, record(json!({"status": "closed"})));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["ruleId"], json!(rule.id));
        assert_eq!(json["conditionsMet"], false);
        assert_eq!(json["actionsToExecute"], json!([]));
        assert_eq!(json["testData"], json!({"status": "closed"}));
        assert!(json.get("anomalies").is_none());
    }

    #[test]
    fn test_trace_kept_only_when_enabled() {
        let rule = sample_rule();
        let data = record(json!({"status": "open"}));

        assert!(RuleExecutor::new().evaluate(&rule, &data).verdict.trace.is_empty());
        let traced = RuleExecutor::new().with_trace().evaluate(&rule, &data);
        assert_eq!(traced.verdict.trace.len(), 1);
        assert!(traced.conditions_met());
    }

    #[test]
    fn test_unknown_action_type_reported() {
        let mut rule = sample_rule();
        rule.actions.push(Action::new(ActionType::from("fax"), json!({})));

        let evaluation = RuleExecutor::new().evaluate(&rule, &record(json!({"status": "open"})));
        assert_eq!(evaluation.actions.len(), 3);
        assert_eq!(
            evaluation.verdict.anomalies,
            vec![EvaluationAnomaly::UnknownActionType {
                index: 2,
                action_type: "fax".into()
            }]
        );
    }

    #[test]
    fn test_inactive_rule_not_executable() {
        let mut rule = sample_rule();
        assert!(RuleExecutor::ensure_executable(&rule).is_ok());

        rule.is_active = false;
        assert!(matches!(
            RuleExecutor::ensure_executable(&rule),
            Err(RuleError::InactiveRule(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_all_collects_failures() {
        let rule = sample_rule();
        let actions = ActionSelector::select(&rule.actions, true);
        let dispatcher = RecordingDispatcher {
            calls: Mutex::new(Vec::new()),
            failing: vec![ActionType::CreateTask],
        };

        let summary = RuleExecutor::dispatch_all(
            &dispatcher,
            &rule,
            &actions,
            &ExecutionTarget::new("lead-1", "lead"),
        )
        .await;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert!(matches!(summary.outcome, ExecutionOutcome::Failure(ref e) if e.starts_with("create_task")));
        assert_eq!(*dispatcher.calls.lock().unwrap(), vec!["create_task", "send_email"]);
    }

    #[tokio::test]
    async fn test_dispatch_all_stop_on_error() {
        let mut rule = sample_rule();
        rule.execution_config.stop_on_error = true;
        let actions = ActionSelector::select(&rule.actions, true);
        let dispatcher = RecordingDispatcher {
            calls: Mutex::new(Vec::new()),
            failing: vec![ActionType::CreateTask],
        };

        let summary = RuleExecutor::dispatch_all(
            &dispatcher,
            &rule,
            &actions,
            &ExecutionTarget::new("lead-1", "lead"),
        )
        .await;

        assert_eq!(summary.attempted, 1);
        assert_eq!(*dispatcher.calls.lock().unwrap(), vec!["create_task"]);
    }
}
