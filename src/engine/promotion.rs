// ==========================================
// 培训管理系统 - 情景采纳
// ==========================================
// 红线: 一个情景只能采纳一次
// 红线: 新计划 + 工作区 ADOPTED 同事务提交
// ==========================================
// 规则:
// - 仅 APPROVED 且快照完整的情景可采纳
// - 新计划总预算/总人数 = 情景聚合值
// - 只为 scenario_volume > 0 的明细生成计划明细
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::plan::{TrainingPlan, TrainingPlanLine};
use crate::domain::types::ScenarioStatus;
use crate::engine::error::{EngineResult, ScenarioEngineError};
use crate::engine::scenario_lock::{with_scenario_lock, ScenarioLockRegistry};
use crate::repository::{ActionLogRepository, ScenarioRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// 采纳请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteRequest {
    pub scenario_id: String,
    pub new_plan_name: String,
    pub description: Option<String>,
    pub actor: String,
}

/// 采纳结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteResult {
    pub scenario_id: String,
    pub new_plan_id: String,
    pub plan_lines: usize,
    pub dropped_lines: usize, // 人数为 0 未带入新计划的明细
    pub total_budget: f64,
    pub total_participants: i64,
}

pub struct PromotionHandler {
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    locks: Arc<ScenarioLockRegistry>,
}

impl PromotionHandler {
    pub fn new(
        scenario_repo: Arc<ScenarioRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        locks: Arc<ScenarioLockRegistry>,
    ) -> Self {
        Self {
            scenario_repo,
            action_log_repo,
            locks,
        }
    }

    #[instrument(skip(self, request), fields(scenario_id = %request.scenario_id))]
    pub fn promote(&self, request: &PromoteRequest) -> EngineResult<PromoteResult> {
        let result = with_scenario_lock(&self.locks, &request.scenario_id, || {
            self.promote_locked(request)
        })?;

        // ADOPTED 为终态，回收锁句柄
        self.locks.release(&request.scenario_id);
        Ok(result)
    }

    fn promote_locked(&self, request: &PromoteRequest) -> EngineResult<PromoteResult> {
        let scenario_id = request.scenario_id.as_str();
        let workspace = self
            .scenario_repo
            .find_by_id(scenario_id)?
            .ok_or_else(|| ScenarioEngineError::NotFound {
                entity: "情景",
                id: scenario_id.to_string(),
            })?;

        if let Some(plan_id) = workspace.promoted_to_plan_id.as_ref() {
            return Err(ScenarioEngineError::AlreadyPromoted {
                scenario_id: scenario_id.to_string(),
                plan_id: plan_id.clone(),
            });
        }
        if !workspace.is_snapshot_complete() {
            return Err(ScenarioEngineError::SnapshotIncomplete {
                scenario_id: scenario_id.to_string(),
                progress: workspace.creation_progress,
            });
        }
        if workspace.status != ScenarioStatus::Approved {
            return Err(ScenarioEngineError::InvalidStateTransition {
                from: workspace.status,
                to: ScenarioStatus::Adopted,
            });
        }

        let lines = self.scenario_repo.find_lines(scenario_id)?;
        let now = chrono::Local::now().naive_local();
        let new_plan_id = Uuid::new_v4().to_string();

        let plan = TrainingPlan {
            plan_id: new_plan_id.clone(),
            plan_name: request.new_plan_name.trim().to_string(),
            description: request.description.clone(),
            version: 1,
            total_budget: workspace.scenario_total_cost,
            total_participants: workspace.scenario_total_participants,
            source_scenario_id: Some(scenario_id.to_string()),
            created_by: request.actor.clone(),
            created_at: now,
            updated_at: now,
        };

        let plan_lines: Vec<TrainingPlanLine> = lines
            .iter()
            .filter(|line| line.scenario_volume > 0)
            .map(|line| TrainingPlanLine {
                line_id: Uuid::new_v4().to_string(),
                plan_id: new_plan_id.clone(),
                line_no: line.line_no,
                course_id: line.course_id.clone(),
                course_name: line.course_name.clone(),
                entity_id: line.entity_id.clone(),
                category_id: line.category_id.clone(),
                volume: line.scenario_volume,
                sessions: line.scenario_sessions,
                cost: line.scenario_cost,
                priority_band: line.priority_band,
                is_protected: line.is_protected,
                is_abroad: line.is_abroad,
            })
            .collect();
        let dropped_lines = lines.len() - plan_lines.len();

        self.scenario_repo
            .commit_promotion(scenario_id, workspace.revision, &plan, &plan_lines)?;

        let log = ActionLog::new(Some(scenario_id.to_string()), ActionType::Promote, &request.actor)
            .with_payload(&json!({
                "new_plan_id": new_plan_id,
                "plan_name": plan.plan_name,
                "plan_lines": plan_lines.len(),
                "dropped_lines": dropped_lines,
                "total_budget": plan.total_budget,
                "total_participants": plan.total_participants,
            }));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("写入采纳审计日志失败: {}", e);
        }

        tracing::info!(
            scenario_id = %scenario_id,
            new_plan_id = %new_plan_id,
            plan_lines = plan_lines.len(),
            "情景已采纳为新计划"
        );

        Ok(PromoteResult {
            scenario_id: scenario_id.to_string(),
            new_plan_id,
            plan_lines: plan_lines.len(),
            dropped_lines,
            total_budget: plan.total_budget,
            total_participants: plan.total_participants,
        })
    }
}
