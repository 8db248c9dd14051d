// ==========================================
// 培训管理系统 - 预算杠杆配置
// ==========================================
// 职责: 重算输入契约（值对象，无身份）
// 红线: 只做校验与派生计算，不含分配逻辑
// ==========================================

use crate::domain::types::{BudgetType, PriorityBand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 杠杆校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeverError {
    #[error("设置了全局预算值但缺少预算类型")]
    MissingBudgetType,

    #[error("全局预算值无效: {0}")]
    InvalidBudgetValue(f64),

    #[error("削减顺序存在重复分档: {0}")]
    DuplicateCutOrderBand(PriorityBand),

    #[error("受保护类别ID不能为空")]
    BlankProtectedCategory,

    #[error("实体上限无效: entity={entity_id}, value={value}")]
    InvalidEntityCap { entity_id: String, value: f64 },

    #[error("实体上限的实体ID不能为空")]
    BlankEntityId,
}

// ==========================================
// EntityCap - 实体级二级上限
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCap {
    #[serde(rename = "type")]
    pub cap_type: BudgetType,
    pub value: f64,
}

fn default_include_bands() -> Vec<PriorityBand> {
    PriorityBand::ALL.to_vec()
}

// ==========================================
// LeverConfig - 杠杆配置
// ==========================================
// JSON 契约字段: globalBudgetType / globalBudgetValue / includePriorityBands /
//               cutOrder / protectedCategories / cutAbroadFirst / entityCaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeverConfig {
    #[serde(default)]
    pub global_budget_type: Option<BudgetType>,

    /// 未设置时不做预算封顶
    #[serde(default)]
    pub global_budget_value: Option<f64>,

    /// 保留的分档；不在集合内的明细全部清零。缺省为全部分档
    #[serde(default = "default_include_bands")]
    pub include_priority_bands: Vec<PriorityBand>,

    /// 削减顺序（靠前的分档先承担削减）
    #[serde(default)]
    pub cut_order: Vec<PriorityBand>,

    #[serde(default)]
    pub protected_categories: Vec<String>,

    #[serde(default)]
    pub cut_abroad_first: bool,

    /// 实体ID -> 上限（BTreeMap 保证序列化顺序稳定，便于审计对比）
    #[serde(default)]
    pub entity_caps: BTreeMap<String, EntityCap>,
}

impl Default for LeverConfig {
    fn default() -> Self {
        Self {
            global_budget_type: None,
            global_budget_value: None,
            include_priority_bands: default_include_bands(),
            cut_order: Vec::new(),
            protected_categories: Vec::new(),
            cut_abroad_first: false,
            entity_caps: BTreeMap::new(),
        }
    }
}

impl LeverConfig {
    /// 校验杠杆（任何写入前调用）
    pub fn validate(&self) -> Result<(), LeverError> {
        if let Some(value) = self.global_budget_value {
            if !value.is_finite() || value < 0.0 {
                return Err(LeverError::InvalidBudgetValue(value));
            }
            if self.global_budget_type.is_none() {
                return Err(LeverError::MissingBudgetType);
            }
        }

        let mut seen = Vec::with_capacity(self.cut_order.len());
        for band in &self.cut_order {
            if seen.contains(band) {
                return Err(LeverError::DuplicateCutOrderBand(*band));
            }
            seen.push(*band);
        }

        if self.protected_categories.iter().any(|c| c.trim().is_empty()) {
            return Err(LeverError::BlankProtectedCategory);
        }

        for (entity_id, cap) in &self.entity_caps {
            if entity_id.trim().is_empty() {
                return Err(LeverError::BlankEntityId);
            }
            if !cap.value.is_finite() || cap.value < 0.0 {
                return Err(LeverError::InvalidEntityCap {
                    entity_id: entity_id.clone(),
                    value: cap.value,
                });
            }
        }

        Ok(())
    }

    /// 计算目标预算
    ///
    /// - 未设置预算值 -> None（不封顶）
    /// - PERCENTAGE -> baseline_total_cost * value / 100
    /// - ABSOLUTE -> value
    pub fn target_budget(&self, baseline_total_cost: f64) -> Option<f64> {
        let value = self.global_budget_value?;
        match self.global_budget_type? {
            BudgetType::Percentage => Some(baseline_total_cost * (value / 100.0)),
            BudgetType::Absolute => Some(value),
        }
    }

    /// 计算实体级目标（基于该实体的基准成本合计）
    pub fn entity_target(&self, entity_id: &str, entity_baseline_cost: f64) -> Option<f64> {
        let cap = self.entity_caps.get(entity_id)?;
        Some(match cap.cap_type {
            BudgetType::Percentage => entity_baseline_cost * (cap.value / 100.0),
            BudgetType::Absolute => cap.value,
        })
    }

    pub fn includes_band(&self, band: PriorityBand) -> bool {
        self.include_priority_bands.contains(&band)
    }

    pub fn is_category_protected(&self, category_id: Option<&str>) -> bool {
        match category_id {
            Some(id) => self.protected_categories.iter().any(|c| c == id),
            None => false,
        }
    }

    /// 分档在削减顺序中的位置（不在列表中返回 None）
    pub fn cut_rank(&self, band: PriorityBand) -> Option<usize> {
        self.cut_order.iter().position(|b| *b == band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_contract() {
        let json = r#"{
            "globalBudgetType": "percentage",
            "globalBudgetValue": 80,
            "includePriorityBands": ["critical", "high"],
            "cutOrder": ["low", "medium"],
            "protectedCategories": ["SAFETY"],
            "cutAbroadFirst": true,
            "entityCaps": {"ENT-1": {"type": "absolute", "value": 5000}}
        }"#;

        let levers: LeverConfig = serde_json::from_str(json).unwrap();
        assert_eq!(levers.global_budget_type, Some(BudgetType::Percentage));
        assert_eq!(levers.global_budget_value, Some(80.0));
        assert_eq!(
            levers.include_priority_bands,
            vec![PriorityBand::Critical, PriorityBand::High]
        );
        assert!(levers.cut_abroad_first);
        assert_eq!(levers.entity_caps["ENT-1"].cap_type, BudgetType::Absolute);
        assert!(levers.validate().is_ok());
    }

    #[test]
    fn test_omitted_bands_default_to_all() {
        let levers: LeverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(levers.include_priority_bands.len(), 4);
        assert_eq!(levers.target_budget(1000.0), None);
    }

    #[test]
    fn test_target_budget() {
        let mut levers = LeverConfig {
            global_budget_type: Some(BudgetType::Percentage),
            global_budget_value: Some(50.0),
            ..Default::default()
        };
        assert_eq!(levers.target_budget(20_000.0), Some(10_000.0));

        levers.global_budget_type = Some(BudgetType::Absolute);
        assert_eq!(levers.target_budget(20_000.0), Some(50.0));
    }

    #[test]
    fn test_validate_rejects_value_without_type() {
        let levers = LeverConfig {
            global_budget_value: Some(100.0),
            ..Default::default()
        };
        assert_eq!(levers.validate(), Err(LeverError::MissingBudgetType));
    }

    #[test]
    fn test_validate_rejects_negative_and_nan_values() {
        let levers = LeverConfig {
            global_budget_type: Some(BudgetType::Absolute),
            global_budget_value: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(levers.validate(), Err(LeverError::InvalidBudgetValue(_))));

        let levers = LeverConfig {
            global_budget_type: Some(BudgetType::Absolute),
            global_budget_value: Some(f64::NAN),
            ..Default::default()
        };
        assert!(levers.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_cut_order() {
        let levers = LeverConfig {
            cut_order: vec![PriorityBand::Low, PriorityBand::Low],
            ..Default::default()
        };
        assert_eq!(
            levers.validate(),
            Err(LeverError::DuplicateCutOrderBand(PriorityBand::Low))
        );
    }

    #[test]
    fn test_entity_target_and_protection_lookup() {
        let mut levers = LeverConfig::default();
        levers.entity_caps.insert(
            "ENT-1".to_string(),
            EntityCap {
                cap_type: BudgetType::Percentage,
                value: 25.0,
            },
        );
        levers.protected_categories.push("SAFETY".to_string());

        assert_eq!(levers.entity_target("ENT-1", 4000.0), Some(1000.0));
        assert_eq!(levers.entity_target("ENT-2", 4000.0), None);
        assert!(levers.is_category_protected(Some("SAFETY")));
        assert!(!levers.is_category_protected(Some("LEADERSHIP")));
        assert!(!levers.is_category_protected(None));
    }
}
