//! 自动化规则仓储（PostgreSQL）
//!
//! 触发器、条件、动作、执行配置和统计以 JSONB 存储，与 API 的 camelCase 文档格式一致。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rule_engine::{
    Action, AutomationRule, Condition, ExecutionConfig, ExecutionOutcome, RuleAnalytics, RuleType,
    Trigger,
};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;
use uuid::Uuid;

use super::traits::AutomationRuleRepositoryTrait;
use crate::dto::{RuleQueryFilter, RuleStats};
use crate::error::{AdminError, Result};

const RULE_COLUMNS: &str = r#"
    id, name, description, is_active, rule_type, priority, trigger_config,
    conditions, actions, execution_config, analytics, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct AutomationRuleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_active: bool,
    rule_type: Option<String>,
    priority: i32,
    trigger_config: Json<Trigger>,
    conditions: Json<Vec<Condition>>,
    actions: Json<Vec<Action>>,
    execution_config: Json<ExecutionConfig>,
    analytics: Json<RuleAnalytics>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AutomationRuleRow> for AutomationRule {
    fn from(row: AutomationRuleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            rule_type: row.rule_type.map(RuleType::from),
            priority: row.priority,
            trigger: row.trigger_config.0,
            conditions: row.conditions.0,
            actions: row.actions.0,
            execution_config: row.execution_config.0,
            analytics: row.analytics.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// 唯一约束冲突转换为名称冲突，其他错误保持为数据库错误
fn map_write_error(err: sqlx::Error, name: &str) -> AdminError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return AdminError::RuleNameConflict(name.to_string());
    }
    AdminError::Database(err)
}

/// ILIKE 模式，转义通配符
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// 自动化规则仓储
pub struct PgAutomationRuleRepository {
    pool: PgPool,
}

impl PgAutomationRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AutomationRuleRepositoryTrait for PgAutomationRuleRepository {
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn create(&self, rule: &AutomationRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_rules (
                id, name, description, is_active, rule_type, priority, trigger_config,
                conditions, actions, execution_config, analytics, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.is_active)
        .bind(rule.rule_type.as_ref().map(RuleType::as_str))
        .bind(rule.priority)
        .bind(Json(&rule.trigger))
        .bind(Json(&rule.conditions))
        .bind(Json(&rule.actions))
        .bind(Json(&rule.execution_config))
        .bind(Json(&rule.analytics))
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &rule.name))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<AutomationRule>> {
        let sql = format!("SELECT {} FROM automation_rules WHERE id = $1", RULE_COLUMNS);
        let row = sqlx::query_as::<_, AutomationRuleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AutomationRule::from))
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> Result<Option<AutomationRule>> {
        let sql = format!("SELECT {} FROM automation_rules WHERE name = $1", RULE_COLUMNS);
        let row = sqlx::query_as::<_, AutomationRuleRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(AutomationRule::from))
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &RuleQueryFilter) -> Result<(Vec<AutomationRule>, i64)> {
        let rule_type = filter.rule_type.as_ref().map(|t| t.as_str().to_string());
        let search = filter.search_term().map(like_pattern);

        let where_clause = r#"
            WHERE ($1::text IS NULL OR rule_type = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR name ILIKE $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM automation_rules {}",
            where_clause
        ))
        .bind(&rule_type)
        .bind(filter.is_active)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let sql = format!(
            "SELECT {} FROM automation_rules {} ORDER BY priority DESC, created_at DESC LIMIT $4 OFFSET $5",
            RULE_COLUMNS, where_clause
        );
        let rows = sqlx::query_as::<_, AutomationRuleRow>(&sql)
            .bind(&rule_type)
            .bind(filter.is_active)
            .bind(&search)
            .bind(filter.limit())
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(AutomationRule::from).collect(), total))
    }

    /// analytics 只在 `reset_analytics` 时写入，其余情况保留行内当前值，
    /// 与 `record_execution` 的行锁串行，不会用过期副本覆盖计数
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    async fn update(
        &self,
        rule: &AutomationRule,
        reset_analytics: bool,
    ) -> Result<Option<RuleAnalytics>> {
        let analytics: Option<Json<RuleAnalytics>> = sqlx::query_scalar(
            r#"
            UPDATE automation_rules
            SET name = $2, description = $3, is_active = $4, rule_type = $5, priority = $6,
                trigger_config = $7, conditions = $8, actions = $9, execution_config = $10,
                analytics = CASE WHEN $11 THEN $12 ELSE analytics END,
                updated_at = $13
            WHERE id = $1
            RETURNING analytics
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.is_active)
        .bind(rule.rule_type.as_ref().map(RuleType::as_str))
        .bind(rule.priority)
        .bind(Json(&rule.trigger))
        .bind(Json(&rule.conditions))
        .bind(Json(&rule.actions))
        .bind(Json(&rule.execution_config))
        .bind(reset_analytics)
        .bind(Json(RuleAnalytics::default()))
        .bind(rule.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &rule.name))?;

        Ok(analytics.map(|Json(analytics)| analytics))
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM automation_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 使用 FOR UPDATE 锁定规则行，并发执行同一规则时计数不会丢失
    #[instrument(skip(self, outcome), fields(outcome = outcome.label()))]
    async fn record_execution(
        &self,
        id: Uuid,
        outcome: &ExecutionOutcome,
        elapsed_ms: f64,
    ) -> Result<Option<RuleAnalytics>> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Json<RuleAnalytics>> = sqlx::query_scalar(
            "SELECT analytics FROM automation_rules WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut analytics)) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        analytics.record(outcome, elapsed_ms, Utc::now());

        sqlx::query("UPDATE automation_rules SET analytics = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(&analytics))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(analytics))
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<RuleStats> {
        let (total_rules, active_rules, total_executions, successful_executions, failed_executions): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE is_active),
                COALESCE(SUM((analytics->>'totalExecutions')::BIGINT), 0)::BIGINT,
                COALESCE(SUM((analytics->>'successfulExecutions')::BIGINT), 0)::BIGINT,
                COALESCE(SUM((analytics->>'failedExecutions')::BIGINT), 0)::BIGINT
            FROM automation_rules
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT COALESCE(rule_type, 'unspecified'), COUNT(*)
            FROM automation_rules
            GROUP BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(RuleStats {
            total_rules,
            active_rules,
            total_executions,
            successful_executions,
            failed_executions,
            rules_by_type: by_type.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("lead"), "%lead%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_map_write_error_passthrough() {
        let err = map_write_error(sqlx::Error::RowNotFound, "welcome");
        assert!(matches!(err, AdminError::Database(_)));
    }

    /// 需要本地数据库：DATABASE_URL=postgres://... cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_record_execution_roundtrip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let repo = PgAutomationRuleRepository::new(pool);

        let rule = AutomationRule::new(
            format!("pg-test-{}", Uuid::now_v7()),
            Trigger::default(),
            vec![],
            vec![],
        );
        repo.create(&rule).await.unwrap();

        repo.record_execution(rule.id, &ExecutionOutcome::Success, 100.0)
            .await
            .unwrap();
        let analytics = repo
            .record_execution(rule.id, &ExecutionOutcome::Success, 300.0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analytics.total_executions, 2);
        assert_eq!(analytics.average_execution_time_ms, 200.0);

        // 持有过期副本的更新不覆盖执行计数
        let mut stale = rule.clone();
        stale.priority = 3;
        let kept = repo.update(&stale, false).await.unwrap().unwrap();
        assert_eq!(kept.total_executions, 2);
        let cleared = repo.update(&stale, true).await.unwrap().unwrap();
        assert_eq!(cleared.total_executions, 0);

        assert!(matches!(
            repo.create(&AutomationRule { id: Uuid::now_v7(), ..rule.clone() }).await,
            Err(AdminError::RuleNameConflict(_))
        ));
        assert!(repo.delete(rule.id).await.unwrap());
    }
}
