//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，PostgreSQL 与内存实现可互换，也便于 mock 测试

use async_trait::async_trait;
use rule_engine::{AutomationRule, ExecutionOutcome, RuleAnalytics};
use uuid::Uuid;

use crate::dto::{RuleQueryFilter, RuleStats};
use crate::error::Result;

/// 自动化规则仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutomationRuleRepositoryTrait: Send + Sync {
    /// 新建规则，名称重复时返回 `RuleNameConflict`
    async fn create(&self, rule: &AutomationRule) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<AutomationRule>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<AutomationRule>>;
    /// 分页查询，按 priority 降序、created_at 降序，返回 (当前页, 总数)
    async fn list(&self, filter: &RuleQueryFilter) -> Result<(Vec<AutomationRule>, i64)>;
    /// 保存规则定义与元数据，执行统计不随之覆盖
    ///
    /// `reset_analytics` 为真时在同一次写入内清零统计。规则不存在时返回 `None`，
    /// 否则返回写入后存储中的统计。
    async fn update(
        &self,
        rule: &AutomationRule,
        reset_analytics: bool,
    ) -> Result<Option<RuleAnalytics>>;
    async fn delete(&self, id: Uuid) -> Result<bool>;
    /// 原子地记录一次执行，规则不存在时返回 `None`
    async fn record_execution(
        &self,
        id: Uuid,
        outcome: &ExecutionOutcome,
        elapsed_ms: f64,
    ) -> Result<Option<RuleAnalytics>>;
    async fn stats(&self) -> Result<RuleStats>;
}
