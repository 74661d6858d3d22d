//! 仓储层
//!
//! 自动化规则的持久化，提供 PostgreSQL 和内存两种实现

mod automation_rule_repo;
mod memory;
mod traits;

pub use automation_rule_repo::PgAutomationRuleRepository;
pub use memory::MemoryAutomationRuleRepository;
pub use traits::AutomationRuleRepositoryTrait;

#[cfg(test)]
pub use traits::MockAutomationRuleRepositoryTrait;
