//! 服务层

mod automation_rule_service;

pub use automation_rule_service::AutomationRuleService;
