//! 自动化规则仓储（内存）
//!
//! 用于本地开发和测试。规则按 id 存放在 DashMap 中，另维护一份名称索引保证名称唯一；
//! 统计更新在条目写锁内完成，同一规则的并发执行不会丢失计数。

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rule_engine::{AutomationRule, ExecutionOutcome, RuleAnalytics};
use std::cmp::Reverse;
use tracing::instrument;
use uuid::Uuid;

use super::traits::AutomationRuleRepositoryTrait;
use crate::dto::{RuleQueryFilter, RuleStats};
use crate::error::{AdminError, Result};

#[derive(Default)]
pub struct MemoryAutomationRuleRepository {
    rules: DashMap<Uuid, AutomationRule>,
    names: DashMap<String, Uuid>,
}

impl MemoryAutomationRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 占用名称，已被其他规则占用时返回冲突
    fn reserve_name(&self, name: &str, id: Uuid) -> Result<()> {
        match self.names.entry(name.to_string()) {
            Entry::Occupied(entry) if *entry.get() != id => {
                Err(AdminError::RuleNameConflict(name.to_string()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    fn matches(rule: &AutomationRule, filter: &RuleQueryFilter, search: Option<&str>) -> bool {
        if let Some(rule_type) = &filter.rule_type
            && rule.rule_type.as_ref() != Some(rule_type)
        {
            return false;
        }
        if let Some(is_active) = filter.is_active
            && rule.is_active != is_active
        {
            return false;
        }
        search.is_none_or(|term| rule.name.to_lowercase().contains(term))
    }
}

#[async_trait]
impl AutomationRuleRepositoryTrait for MemoryAutomationRuleRepository {
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn create(&self, rule: &AutomationRule) -> Result<()> {
        self.reserve_name(&rule.name, rule.id)?;
        self.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AutomationRule>> {
        Ok(self.rules.get(&id).map(|r| r.clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<AutomationRule>> {
        let Some(id) = self.names.get(name).map(|r| *r) else {
            return Ok(None);
        };
        self.get(id).await
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &RuleQueryFilter) -> Result<(Vec<AutomationRule>, i64)> {
        let search = filter.search_term().map(str::to_lowercase);

        let mut matched: Vec<AutomationRule> = self
            .rules
            .iter()
            .filter(|r| Self::matches(r.value(), filter, search.as_deref()))
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by_key(|r| (Reverse(r.priority), Reverse(r.created_at)));

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();

        Ok((page, total))
    }

    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn update(
        &self,
        rule: &AutomationRule,
        reset_analytics: bool,
    ) -> Result<Option<RuleAnalytics>> {
        let Some(mut entry) = self.rules.get_mut(&rule.id) else {
            return Ok(None);
        };

        if entry.name != rule.name {
            self.reserve_name(&rule.name, rule.id)?;
            self.names.remove(&entry.name);
        }

        // 统计以存储中的为准，调用方手里的副本可能已过期
        let analytics = if reset_analytics {
            RuleAnalytics::default()
        } else {
            entry.analytics.clone()
        };
        *entry = AutomationRule {
            analytics: analytics.clone(),
            ..rule.clone()
        };
        Ok(Some(analytics))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        match self.rules.remove(&id) {
            Some((_, rule)) => {
                self.names.remove(&rule.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self, outcome), fields(outcome = outcome.label()))]
    async fn record_execution(
        &self,
        id: Uuid,
        outcome: &ExecutionOutcome,
        elapsed_ms: f64,
    ) -> Result<Option<RuleAnalytics>> {
        Ok(self.rules.get_mut(&id).map(|mut rule| {
            rule.analytics.record(outcome, elapsed_ms, Utc::now());
            rule.analytics.clone()
        }))
    }

    async fn stats(&self) -> Result<RuleStats> {
        let mut stats = RuleStats::default();

        for rule in self.rules.iter() {
            stats.total_rules += 1;
            if rule.is_active {
                stats.active_rules += 1;
            }
            stats.total_executions += rule.analytics.total_executions;
            stats.successful_executions += rule.analytics.successful_executions;
            stats.failed_executions += rule.analytics.failed_executions;
            *stats
                .rules_by_type
                .entry(rule.rule_type_label().to_string())
                .or_insert(0) += 1;
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rule_engine::{RuleType, Trigger};
    use std::sync::Arc;

    fn rule(name: &str, priority: i32) -> AutomationRule {
        let mut rule = AutomationRule::new(name, Trigger::default(), vec![], vec![]);
        rule.priority = priority;
        rule
    }

    #[tokio::test]
    async fn test_name_uniqueness() {
        let repo = MemoryAutomationRuleRepository::new();
        repo.create(&rule("welcome", 0)).await.unwrap();

        let result = repo.create(&rule("welcome", 1)).await;
        assert!(matches!(result, Err(AdminError::RuleNameConflict(_))));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_releases_old_name() {
        let repo = MemoryAutomationRuleRepository::new();
        let mut original = rule("old", 0);
        repo.create(&original).await.unwrap();

        original.name = "new".into();
        assert!(repo.update(&original, false).await.unwrap().is_some());
        assert!(repo.find_by_name("old").await.unwrap().is_none());
        assert!(repo.find_by_name("new").await.unwrap().is_some());

        repo.create(&rule("old", 0)).await.unwrap();
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let repo = MemoryAutomationRuleRepository::new();
        let mut scoring = rule("Lead scoring", 1);
        scoring.rule_type = Some(RuleType::LeadScoring);
        let mut inactive = rule("Old lead cleanup", 9);
        inactive.is_active = false;
        repo.create(&scoring).await.unwrap();
        repo.create(&inactive).await.unwrap();
        repo.create(&rule("Welcome", 5)).await.unwrap();

        let (all, total) = repo.list(&RuleQueryFilter::default()).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Old lead cleanup", "Welcome", "Lead scoring"]);

        let filter = RuleQueryFilter {
            search: Some("LEAD".into()),
            is_active: Some(true),
            ..Default::default()
        };
        let (found, total) = repo.list(&filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].name, "Lead scoring");

        let filter = RuleQueryFilter {
            page: 2,
            page_size: 2,
            ..Default::default()
        };
        let (page, total) = repo.list(&filter).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_not_lost() {
        let repo = Arc::new(MemoryAutomationRuleRepository::new());
        let target = rule("busy", 0);
        repo.create(&target).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let repo = repo.clone();
                let id = target.id;
                tokio::spawn(async move {
                    let outcome = if i % 5 == 0 {
                        ExecutionOutcome::Failure("boom".into())
                    } else {
                        ExecutionOutcome::Success
                    };
                    repo.record_execution(id, &outcome, 10.0).await.unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let analytics = repo.get(target.id).await.unwrap().unwrap().analytics;
        assert_eq!(analytics.total_executions, 50);
        assert_eq!(analytics.failed_executions, 10);
        assert_eq!(analytics.successful_executions, 40);
        assert_eq!(analytics.average_execution_time_ms, 10.0);
    }

    #[tokio::test]
    async fn test_update_with_stale_copy_keeps_execution_counts() {
        let repo = MemoryAutomationRuleRepository::new();
        let mut stale = rule("busy", 0);
        repo.create(&stale).await.unwrap();

        repo.record_execution(stale.id, &ExecutionOutcome::Success, 4.0)
            .await
            .unwrap();
        stale.is_active = false;

        let analytics = repo.update(&stale, false).await.unwrap().unwrap();
        assert_eq!(analytics.total_executions, 1);

        let stored = repo.get(stale.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.analytics.total_executions, 1);
        assert_eq!(stored.analytics.average_execution_time_ms, 4.0);
    }

    #[tokio::test]
    async fn test_update_resets_analytics_on_request() {
        let repo = MemoryAutomationRuleRepository::new();
        let target = rule("reset me", 0);
        repo.create(&target).await.unwrap();
        repo.record_execution(target.id, &ExecutionOutcome::Failure("x".into()), 1.0)
            .await
            .unwrap();

        let analytics = repo.update(&target, true).await.unwrap().unwrap();
        assert_eq!(analytics, RuleAnalytics::default());
        assert_eq!(
            repo.get(target.id).await.unwrap().unwrap().analytics,
            RuleAnalytics::default()
        );
    }

    #[tokio::test]
    async fn test_update_missing_rule() {
        let repo = MemoryAutomationRuleRepository::new();
        assert!(repo.update(&rule("ghost", 0), false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_execution_missing_rule() {
        let repo = MemoryAutomationRuleRepository::new();
        let result = repo
            .record_execution(Uuid::now_v7(), &ExecutionOutcome::Success, 1.0)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let repo = MemoryAutomationRuleRepository::new();
        let mut notify = rule("notify", 0);
        notify.rule_type = Some(RuleType::Notification);
        repo.create(&notify).await.unwrap();
        repo.create(&rule("plain", 0)).await.unwrap();
        repo.record_execution(notify.id, &ExecutionOutcome::Success, 5.0)
            .await
            .unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total_rules, 2);
        assert_eq!(stats.active_rules, 2);
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.rules_by_type.get("notification"), Some(&1));
        assert_eq!(stats.rules_by_type.get("unspecified"), Some(&1));
    }
}
