// ==========================================
// 培训管理系统 - 情景生命周期
// ==========================================
// 状态机: DRAFT -> UNDER_REVIEW -> APPROVED -> (采纳) ADOPTED
//         UNDER_REVIEW -> DRAFT (退回)
//         DRAFT / UNDER_REVIEW / APPROVED -> ARCHIVED
// 红线: ADOPTED 只能通过采纳进入；仅 DRAFT 可删除
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::scenario::ScenarioWorkspace;
use crate::domain::types::ScenarioStatus;
use crate::engine::error::{EngineResult, ScenarioEngineError};
use crate::engine::scenario_lock::{with_scenario_lock, ScenarioLockRegistry};
use crate::repository::{ActionLogRepository, ScenarioRepository};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

pub struct LifecycleService {
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    locks: Arc<ScenarioLockRegistry>,
}

impl LifecycleService {
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

    /// 状态流转（提交审核 / 批准 / 退回 / 归档）
    #[instrument(skip(self, scenario_id, next), fields(scenario_id = %scenario_id, next = %next))]
    pub fn transition(
        &self,
        scenario_id: &str,
        next: ScenarioStatus,
        actor: &str,
    ) -> EngineResult<ScenarioWorkspace> {
        let workspace = with_scenario_lock(&self.locks, scenario_id, || {
            let workspace = self.load(scenario_id)?;
            let from = workspace.status;

            if from == ScenarioStatus::Creating {
                return Err(ScenarioEngineError::SnapshotIncomplete {
                    scenario_id: scenario_id.to_string(),
                    progress: workspace.creation_progress,
                });
            }
            if next == ScenarioStatus::Adopted || !from.can_transition_to(next) {
                return Err(ScenarioEngineError::InvalidStateTransition { from, to: next });
            }
            // 快照失败的情景只能归档或删除
            if next != ScenarioStatus::Archived && !workspace.is_snapshot_complete() {
                return Err(ScenarioEngineError::SnapshotIncomplete {
                    scenario_id: scenario_id.to_string(),
                    progress: workspace.creation_progress,
                });
            }

            self.scenario_repo
                .update_status(scenario_id, workspace.revision, next)?;

            let log = ActionLog::new(Some(scenario_id.to_string()), ActionType::StatusChange, actor)
                .with_payload(&json!({ "from": from, "to": next }));
            if let Err(e) = self.action_log_repo.insert(&log) {
                tracing::warn!("写入状态流转审计日志失败: {}", e);
            }

            tracing::info!(scenario_id = %scenario_id, from = %from, to = %next, "情景状态已变更");
            self.load(scenario_id)
        })?;

        // 终态不再有写入，回收锁句柄
        if workspace.status.is_terminal() {
            self.locks.release(scenario_id);
        }
        Ok(workspace)
    }

    /// 删除情景（仅 DRAFT；明细级联删除，审计日志保留）
    #[instrument(skip(self))]
    pub fn delete(&self, scenario_id: &str, actor: &str) -> EngineResult<()> {
        with_scenario_lock(&self.locks, scenario_id, || {
            let workspace = self.load(scenario_id)?;
            if workspace.status != ScenarioStatus::Draft {
                return Err(ScenarioEngineError::NotEditable {
                    scenario_id: scenario_id.to_string(),
                    status: workspace.status,
                });
            }

            self.scenario_repo.delete(scenario_id)?;

            let log = ActionLog::new(Some(scenario_id.to_string()), ActionType::Delete, actor)
                .with_payload(&json!({
                    "name": workspace.name,
                    "basis_plan_id": workspace.basis_plan_id,
                }));
            if let Err(e) = self.action_log_repo.insert(&log) {
                tracing::warn!("写入删除审计日志失败: {}", e);
            }

            tracing::info!(scenario_id = %scenario_id, "情景已删除");
            Ok(())
        })?;

        self.locks.release(scenario_id);
        Ok(())
    }

    fn load(&self, scenario_id: &str) -> EngineResult<ScenarioWorkspace> {
        self.scenario_repo
            .find_by_id(scenario_id)?
            .ok_or_else(|| ScenarioEngineError::NotFound {
                entity: "情景",
                id: scenario_id.to_string(),
            })
    }
}
