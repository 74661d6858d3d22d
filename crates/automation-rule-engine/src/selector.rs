//! 动作选择器

use crate::models::{Action, ActionType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 待执行的动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedAction {
    pub action_type: ActionType,
    pub action_data: Value,
    pub order: i32,
}

impl From<&Action> for SelectedAction {
    fn from(action: &Action) -> Self {
        Self {
            action_type: action.action_type.clone(),
            action_data: action.action_data.clone(),
            order: action.order,
        }
    }
}

pub struct ActionSelector;

impl ActionSelector {
    /// 条件满足时选出启用的动作，并按 `order` 升序稳定排序
    ///
    /// 同一 `order` 的动作保持原有顺序；禁用的动作不会出现在结果中。
    pub fn select(actions: &[Action], conditions_met: bool) -> Vec<SelectedAction> {
        if !conditions_met {
            return Vec::new();
        }

        let mut selected: Vec<SelectedAction> = actions
            .iter()
            .filter(|action| action.enabled)
            .map(SelectedAction::from)
            .collect();
        selected.sort_by_key(|action| action.order);
        selected
    }
}
