// ==========================================
// 培训管理系统 - 培训计划领域模型
// ==========================================
// 职责: 基准培训计划 / 计划明细
// 说明: 情景采纳后会生成新的培训计划
// ==========================================

use crate::domain::types::PriorityBand;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// TrainingPlan - 培训计划
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub plan_id: String,
    pub plan_name: String,
    pub description: Option<String>,
    pub version: i32,                        // 计划版本号（情景的 basis_plan_version 指向它）
    pub total_budget: f64,                   // 计划预算合计
    pub total_participants: i64,             // 计划人数合计
    pub source_scenario_id: Option<String>,  // 由情景采纳生成时记录来源
    pub created_by: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// TrainingPlanLine - 计划明细
// ==========================================
// 一行 = 课程 (可选限定到实体/类别)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPlanLine {
    pub line_id: String,
    pub plan_id: String,
    pub line_no: i32,
    pub course_id: String,
    pub course_name: String,
    pub entity_id: Option<String>,
    pub category_id: Option<String>,
    pub volume: i64,        // 参训人数
    pub sessions: i64,      // 班次
    pub cost: f64,          // 总成本
    pub priority_band: PriorityBand,
    pub is_protected: bool,
    pub is_abroad: bool,
}
