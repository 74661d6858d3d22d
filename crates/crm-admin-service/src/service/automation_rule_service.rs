//! 自动化规则服务
//!
//! 规则的增删改查、试运行和手动执行。校验、评估和统计计算委托给规则引擎，
//! 持久化委托给仓储，生命周期事件交给事件接收方（失败只记日志，不影响请求）。

use std::sync::Arc;
use std::time::Instant;

use crm_shared::observability::metrics;
use rule_engine::{
    ActionDispatcher, AutomationRule, EvaluationAnomaly, ExecutionOutcome, ExecutionTarget,
    RuleEvent, RuleEventSink, RuleExecutor, RuleValidator, TestReport, ValidationMode,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dto::{
    CreateAutomationRuleRequest, ExecuteRuleRequest, ExecuteRuleResponse, PageResponse,
    RuleQueryFilter, RuleStats, TestRuleRequest, UpdateAutomationRuleRequest,
};
use crate::error::{AdminError, Result};
use crate::repository::AutomationRuleRepositoryTrait;

/// 自动化规则服务
pub struct AutomationRuleService {
    repo: Arc<dyn AutomationRuleRepositoryTrait>,
    events: Arc<dyn RuleEventSink>,
    dispatcher: Arc<dyn ActionDispatcher>,
    executor: RuleExecutor,
}

impl AutomationRuleService {
    pub fn new(
        repo: Arc<dyn AutomationRuleRepositoryTrait>,
        events: Arc<dyn RuleEventSink>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self {
            repo,
            events,
            dispatcher,
            executor: RuleExecutor::new(),
        }
    }

    /// 启用条件评估追踪（debug 日志输出每个条件的结果）
    pub fn with_trace(mut self) -> Self {
        self.executor = self.executor.with_trace();
        self
    }

    /// 创建规则
    #[instrument(skip(self, req), fields(name = %req.name))]
    pub async fn create(&self, mut req: CreateAutomationRuleRequest) -> Result<AutomationRule> {
        // 先去除首尾空白再校验，纯空白名称按空名称拒绝
        req.name = req.name.trim().to_string();
        req.validate()?;
        RuleValidator::check(&req.definition, ValidationMode::Create)?;

        let name = req.name.clone();
        if self.repo.find_by_name(&name).await?.is_some() {
            return Err(AdminError::RuleNameConflict(name));
        }

        let mut rule = AutomationRule::from_input(name, req.definition);
        rule.description = req.description;
        rule.is_active = req.is_active.unwrap_or(true);
        rule.priority = req.priority.unwrap_or(0);

        self.repo.create(&rule).await?;

        info!(rule_id = %rule.id, name = %rule.name, "Automation rule created");
        self.emit(RuleEvent::Created {
            rule_id: rule.id,
            name: rule.name.clone(),
        })
        .await;

        Ok(rule)
    }

    /// 获取规则详情
    pub async fn get(&self, id: Uuid) -> Result<AutomationRule> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| AdminError::RuleNotFound(id.to_string()))
    }

    /// 分页查询规则
    pub async fn list(&self, filter: RuleQueryFilter) -> Result<PageResponse<AutomationRule>> {
        let (items, total) = self.repo.list(&filter).await?;
        Ok(PageResponse::new(
            items,
            total,
            filter.page.max(1),
            filter.limit(),
        ))
    }

    /// 更新规则
    ///
    /// 触发器、条件或动作发生变化时清零执行统计。
    #[instrument(skip(self, req))]
    pub async fn update(
        &self,
        id: Uuid,
        mut req: UpdateAutomationRuleRequest,
    ) -> Result<AutomationRule> {
        if let Some(name) = req.name.as_mut() {
            *name = name.trim().to_string();
        }
        req.validate()?;
        RuleValidator::check(&req.definition, ValidationMode::Update)?;

        let mut rule = self.get(id).await?;

        if let Some(name) = req.name
            && name != rule.name
        {
            if let Some(existing) = self.repo.find_by_name(&name).await?
                && existing.id != id
            {
                return Err(AdminError::RuleNameConflict(name));
            }
            rule.name = name;
        }
        if let Some(description) = req.description {
            rule.description = Some(description);
        }
        if let Some(is_active) = req.is_active {
            rule.is_active = is_active;
        }
        if let Some(priority) = req.priority {
            rule.priority = priority;
        }

        let analytics_reset = rule.apply_input(req.definition);

        // 统计只由仓储维护：保留存储中的计数，或在同一次写入内清零
        rule.analytics = self
            .repo
            .update(&rule, analytics_reset)
            .await?
            .ok_or_else(|| AdminError::RuleNotFound(id.to_string()))?;

        info!(rule_id = %id, analytics_reset, "Automation rule updated");
        self.emit(RuleEvent::Updated {
            rule_id: id,
            name: rule.name.clone(),
            analytics_reset,
        })
        .await;

        Ok(rule)
    }

    /// 删除规则
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let rule = self.get(id).await?;
        if !self.repo.delete(id).await? {
            return Err(AdminError::RuleNotFound(id.to_string()));
        }

        info!(rule_id = %id, "Automation rule deleted");
        self.emit(RuleEvent::Deleted {
            rule_id: id,
            name: rule.name,
        })
        .await;

        Ok(())
    }

    /// 切换启用状态
    #[instrument(skip(self))]
    pub async fn toggle(&self, id: Uuid) -> Result<AutomationRule> {
        let mut rule = self.get(id).await?;
        rule.is_active = !rule.is_active;
        rule.updated_at = chrono::Utc::now();

        rule.analytics = self
            .repo
            .update(&rule, false)
            .await?
            .ok_or_else(|| AdminError::RuleNotFound(id.to_string()))?;

        info!(rule_id = %id, is_active = rule.is_active, "Automation rule toggled");
        self.emit(RuleEvent::StatusChanged {
            rule_id: id,
            is_active: rule.is_active,
        })
        .await;

        Ok(rule)
    }

    /// 试运行：不要求规则启用，不修改统计
    #[instrument(skip(self, req))]
    pub async fn test(&self, id: Uuid, req: TestRuleRequest) -> Result<TestReport> {
        let rule = self.get(id).await?;
        let report = self.executor.test(&rule, req.test_data);

        report_anomalies(rule.id, &report.anomalies);
        metrics::record_rule_test(report.conditions_met);

        info!(
            rule_id = %id,
            conditions_met = report.conditions_met,
            actions = report.actions_to_execute.len(),
            "Automation rule tested"
        );

        Ok(report)
    }

    /// 手动执行
    ///
    /// 未提供 targetData 时只记录一次成功执行；提供时按该数据评估条件并派发选中的动作，
    /// 派发失败记为失败执行。
    #[instrument(skip(self, req), fields(target_id = %req.target_id))]
    pub async fn execute(&self, id: Uuid, req: ExecuteRuleRequest) -> Result<ExecuteRuleResponse> {
        req.validate()?;
        let rule = self.get(id).await?;
        RuleExecutor::ensure_executable(&rule)?;

        let start = Instant::now();
        let mut target = ExecutionTarget::new(req.target_id, req.target_type);

        let (outcome, conditions_met, actions_executed) = match req.target_data {
            None => (ExecutionOutcome::Success, None, None),
            Some(data) => {
                target = target.with_data(data);
                let evaluation = self.executor.evaluate(&rule, &target.data);
                report_anomalies(rule.id, &evaluation.verdict.anomalies);

                let summary = RuleExecutor::dispatch_all(
                    self.dispatcher.as_ref(),
                    &rule,
                    &evaluation.actions,
                    &target,
                )
                .await;
                (
                    summary.outcome,
                    Some(evaluation.verdict.met),
                    Some(summary.succeeded),
                )
            }
        };

        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        if self
            .repo
            .record_execution(id, &outcome, elapsed_ms)
            .await?
            .is_none()
        {
            return Err(AdminError::RuleNotFound(id.to_string()));
        }

        metrics::record_rule_execution(
            rule.rule_type_label(),
            outcome.label(),
            elapsed.as_secs_f64(),
        );

        let message = match &outcome {
            ExecutionOutcome::Success => "Rule executed successfully".to_string(),
            ExecutionOutcome::Failure(e) => format!("Rule executed with errors: {}", e),
        };

        info!(
            rule_id = %id,
            outcome = outcome.label(),
            elapsed_ms,
            "Automation rule executed"
        );
        self.emit(RuleEvent::Executed {
            rule_id: id,
            outcome,
            elapsed_ms,
        })
        .await;

        Ok(ExecuteRuleResponse {
            message,
            execution_time_ms: elapsed_ms,
            target,
            conditions_met,
            actions_executed,
        })
    }

    /// 汇总统计
    pub async fn stats(&self) -> Result<RuleStats> {
        self.repo.stats().await
    }

    async fn emit(&self, event: RuleEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!(
                rule_id = %event.rule_id(),
                action = event.action(),
                error = %e,
                "Failed to publish rule event"
            );
        }
    }
}

fn report_anomalies(rule_id: Uuid, anomalies: &[EvaluationAnomaly]) {
    for anomaly in anomalies {
        warn!(rule_id = %rule_id, kind = anomaly.kind(), "{}", anomaly);
        metrics::record_rule_anomaly(anomaly.kind());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::MemoryActivityLog;
    use crate::repository::{MemoryAutomationRuleRepository, MockAutomationRuleRepositoryTrait};
    use async_trait::async_trait;
    use rule_engine::{
        Action, ActionType, Condition, ConditionOperator, LoggingDispatcher, Record, RuleAnalytics,
        RuleInput, Trigger,
    };
    use serde_json::json;

    fn sample_rule() -> AutomationRule {
        let mut rule = AutomationRule::new(
            "Open lead follow-up",
            Trigger::default(),
            vec![Condition::new("status", ConditionOperator::Equals, "open")],
            vec![Action::new(ActionType::SendEmail, json!({"subject": "hi"}))],
        );
        rule.analytics.total_executions = 4;
        rule
    }

    fn service(repo: MockAutomationRuleRepositoryTrait) -> (AutomationRuleService, Arc<MemoryActivityLog>) {
        let log = Arc::new(MemoryActivityLog::new());
        let service =
            AutomationRuleService::new(Arc::new(repo), log.clone(), Arc::new(LoggingDispatcher));
        (service, log)
    }

    fn create_request(name: &str) -> CreateAutomationRuleRequest {
        serde_json::from_value(json!({
            "name": name,
            "trigger": {"eventType": "record_created"},
            "actions": [{"actionType": "send_email", "actionData": {"subject": "hi"}}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_find_by_name()
            .returning(|_| Ok(Some(sample_rule())));
        repo.expect_create().never();

        let (service, log) = service(repo);
        let result = service.create(create_request("Open lead follow-up")).await;

        assert!(matches!(result, Err(AdminError::RuleNameConflict(_))));
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition_before_storage() {
        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_find_by_name().never();
        repo.expect_create().never();

        let (service, _) = service(repo);
        let mut req = create_request("No actions");
        req.definition.actions = Some(vec![]);

        let result = service.create(req).await;
        assert!(matches!(result, Err(AdminError::RuleValidation(ref e)) if e[0].field == "actions"));
    }

    #[tokio::test]
    async fn test_create_persists_and_emits() {
        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_find_by_name().returning(|_| Ok(None));
        repo.expect_create()
            .withf(|rule| rule.name == "Welcome" && rule.is_active && rule.analytics == RuleAnalytics::default())
            .times(1)
            .returning(|_| Ok(()));

        let (service, log) = service(repo);
        let rule = service.create(create_request("  Welcome ")).await.unwrap();

        assert_eq!(log.actions_for(rule.id), vec!["automation_rule_created"]);
    }

    #[tokio::test]
    async fn test_update_resets_analytics_when_definition_changes() {
        let existing = sample_rule();
        let id = existing.id;

        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().returning(move |_| Ok(Some(existing.clone())));
        repo.expect_update()
            .withf(|rule, reset| *reset && rule.conditions.is_empty())
            .times(1)
            .returning(|_, _| Ok(Some(RuleAnalytics::default())));

        let (service, log) = service(repo);
        let req = UpdateAutomationRuleRequest {
            definition: RuleInput {
                conditions: Some(vec![]),
                ..Default::default()
            },
            ..Default::default()
        };
        let updated = service.update(id, req).await.unwrap();

        assert_eq!(updated.analytics.total_executions, 0);

        assert_eq!(log.entries()[0].metadata["analytics_reset"], true);
    }

    #[tokio::test]
    async fn test_update_keeps_analytics_for_metadata_changes() {
        let existing = sample_rule();
        let id = existing.id;

        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().returning(move |_| Ok(Some(existing.clone())));
        repo.expect_update()
            .withf(|rule, reset| !*reset && rule.priority == 7)
            .times(1)
            .returning(|_, _| {
                Ok(Some(RuleAnalytics {
                    total_executions: 9,
                    ..Default::default()
                }))
            });

        let (service, _) = service(repo);
        let req = UpdateAutomationRuleRequest {
            priority: Some(7),
            ..Default::default()
        };
        let updated = service.update(id, req).await.unwrap();

        // 返回存储中的最新计数，而非读取时的副本
        assert_eq!(updated.analytics.total_executions, 9);
    }

    #[tokio::test]
    async fn test_test_never_records_execution() {
        let mut rule = sample_rule();
        rule.is_active = false;
        let id = rule.id;

        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().returning(move |_| Ok(Some(rule.clone())));
        repo.expect_record_execution().never();
        repo.expect_update().never();

        let (service, _) = service(repo);
        let mut data = Record::new();
        data.insert("status".into(), json!("open"));

        let report = service.test(id, TestRuleRequest { test_data: data }).await.unwrap();
        assert!(report.conditions_met);
        assert_eq!(report.actions_to_execute.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_inactive_rule_rejected() {
        let mut rule = sample_rule();
        rule.is_active = false;

        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().returning(move |_| Ok(Some(rule.clone())));
        repo.expect_record_execution().never();

        let (service, _) = service(repo);
        let req = ExecuteRuleRequest {
            target_id: "lead-1".into(),
            target_type: "lead".into(),
            target_data: None,
        };
        let err = service.execute(Uuid::now_v7(), req).await.unwrap_err();
        assert_eq!(err.error_code(), "INACTIVE_RULE");
    }

    #[tokio::test]
    async fn test_execute_missing_rule() {
        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().returning(|_| Ok(None));

        let (service, _) = service(repo);
        let req = ExecuteRuleRequest {
            target_id: "lead-1".into(),
            target_type: "lead".into(),
            target_data: None,
        };
        let err = service.execute(Uuid::now_v7(), req).await.unwrap_err();
        assert!(matches!(err, AdminError::RuleNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_with_target_data_evaluates_rule() {
        let rule = sample_rule();
        let id = rule.id;

        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().returning(move |_| Ok(Some(rule.clone())));
        repo.expect_record_execution()
            .withf(|_, outcome, elapsed| outcome.is_success() && *elapsed >= 0.0)
            .times(1)
            .returning(|_, _, _| Ok(Some(RuleAnalytics::default())));

        let (service, log) = service(repo);
        let mut data = Record::new();
        data.insert("status".into(), json!("closed"));
        let req = ExecuteRuleRequest {
            target_id: "lead-1".into(),
            target_type: "lead".into(),
            target_data: Some(data),
        };

        let resp = service.execute(id, req).await.unwrap();
        assert_eq!(resp.conditions_met, Some(false));
        assert_eq!(resp.actions_executed, Some(0));
        assert_eq!(resp.target.id, "lead-1");
        assert_eq!(log.actions_for(id), vec!["automation_rule_executed"]);
    }

    #[tokio::test]
    async fn test_create_rejects_whitespace_name() {
        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_find_by_name().never();
        repo.expect_create().never();

        let (service, _) = service(repo);
        let result = service.create(create_request("   ")).await;

        assert!(matches!(result, Err(AdminError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_whitespace_name() {
        let mut repo = MockAutomationRuleRepositoryTrait::new();
        repo.expect_get().never();
        repo.expect_update().never();

        let (service, _) = service(repo);
        let req = UpdateAutomationRuleRequest {
            name: Some(" \t ".into()),
            ..Default::default()
        };
        let result = service.update(Uuid::now_v7(), req).await;

        assert!(matches!(result, Err(AdminError::Validation(_))));
    }

    /// 在写回规则前插入一次执行，模拟 execute 落在读取与写回之间
    struct ExecuteDuringUpdate {
        inner: MemoryAutomationRuleRepository,
    }

    #[async_trait]
    impl AutomationRuleRepositoryTrait for ExecuteDuringUpdate {
        async fn create(&self, rule: &AutomationRule) -> Result<()> {
            self.inner.create(rule).await
        }
        async fn get(&self, id: Uuid) -> Result<Option<AutomationRule>> {
            self.inner.get(id).await
        }
        async fn find_by_name(&self, name: &str) -> Result<Option<AutomationRule>> {
            self.inner.find_by_name(name).await
        }
        async fn list(&self, filter: &RuleQueryFilter) -> Result<(Vec<AutomationRule>, i64)> {
            self.inner.list(filter).await
        }
        async fn update(
            &self,
            rule: &AutomationRule,
            reset_analytics: bool,
        ) -> Result<Option<RuleAnalytics>> {
            self.inner
                .record_execution(rule.id, &ExecutionOutcome::Success, 3.0)
                .await?;
            self.inner.update(rule, reset_analytics).await
        }
        async fn delete(&self, id: Uuid) -> Result<bool> {
            self.inner.delete(id).await
        }
        async fn record_execution(
            &self,
            id: Uuid,
            outcome: &ExecutionOutcome,
            elapsed_ms: f64,
        ) -> Result<Option<RuleAnalytics>> {
            self.inner.record_execution(id, outcome, elapsed_ms).await
        }
        async fn stats(&self) -> Result<RuleStats> {
            self.inner.stats().await
        }
    }

    fn interleaving_service() -> (AutomationRuleService, Arc<ExecuteDuringUpdate>) {
        let repo = Arc::new(ExecuteDuringUpdate {
            inner: MemoryAutomationRuleRepository::new(),
        });
        let service = AutomationRuleService::new(
            repo.clone(),
            Arc::new(MemoryActivityLog::new()),
            Arc::new(LoggingDispatcher),
        );
        (service, repo)
    }

    #[tokio::test]
    async fn test_toggle_keeps_concurrent_execution() {
        let (service, repo) = interleaving_service();
        let rule = sample_rule();
        let id = rule.id;
        repo.inner.create(&rule).await.unwrap();

        let toggled = service.toggle(id).await.unwrap();

        // 存储中原有 4 次，加上交错的 1 次
        assert!(!toggled.is_active);
        assert_eq!(toggled.analytics.total_executions, 5);
        let stored = repo.inner.get(id).await.unwrap().unwrap();
        assert_eq!(stored.analytics.total_executions, 5);
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_metadata_update_keeps_concurrent_execution() {
        let (service, repo) = interleaving_service();
        let rule = sample_rule();
        let id = rule.id;
        repo.inner.create(&rule).await.unwrap();

        let req = UpdateAutomationRuleRequest {
            priority: Some(3),
            ..Default::default()
        };
        let updated = service.update(id, req).await.unwrap();

        assert_eq!(updated.priority, 3);
        assert_eq!(updated.analytics.total_executions, 5);
        assert_eq!(
            repo.inner.get(id).await.unwrap().unwrap().analytics.total_executions,
            5
        );
    }
}
