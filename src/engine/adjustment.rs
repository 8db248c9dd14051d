// ==========================================
// 培训管理系统 - 局部调整
// ==========================================
// 红线: 调整后的明细永久锁定，重算不再触碰（没有解锁路径）
// 红线: 人数高于当前情景值时必须填写理由
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::scenario::{scale_sessions, LineAdjustment, MAX_LINE_VOLUME};
use crate::engine::error::{EngineResult, ScenarioEngineError};
use crate::engine::scenario_lock::{with_scenario_lock, ScenarioLockRegistry};
use crate::repository::{ActionLogRepository, ScenarioRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// 局部调整请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustLineRequest {
    pub scenario_id: String,
    pub line_id: String,
    pub new_volume: i64,
    pub reason: Option<String>,
    pub actor: String,
}

/// 局部调整结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustLineResult {
    pub scenario_id: String,
    pub line_id: String,
    pub previous_volume: i64,
    pub new_volume: i64,
    pub new_sessions: i64,
    pub new_cost: f64,
    pub scenario_total_cost: f64,
    pub scenario_total_participants: i64,
    pub revision: i32,
}

pub struct AdjustmentHandler {
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    locks: Arc<ScenarioLockRegistry>,
}

impl AdjustmentHandler {
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

    /// 调整单行人数并锁定
    ///
    /// new_cost = new_volume * 基准人均成本；已锁定的明细允许再次调整。
    #[instrument(skip(self, request), fields(
        scenario_id = %request.scenario_id,
        line_id = %request.line_id,
        new_volume = request.new_volume
    ))]
    pub fn adjust_line(&self, request: &AdjustLineRequest) -> EngineResult<AdjustLineResult> {
        if !(0..=MAX_LINE_VOLUME).contains(&request.new_volume) {
            return Err(ScenarioEngineError::Validation(format!(
                "调整人数必须在0-{}之间: {}",
                MAX_LINE_VOLUME, request.new_volume
            )));
        }

        with_scenario_lock(&self.locks, &request.scenario_id, || {
            self.adjust_line_locked(request)
        })
    }

    fn adjust_line_locked(&self, request: &AdjustLineRequest) -> EngineResult<AdjustLineResult> {
        let scenario_id = request.scenario_id.as_str();
        let workspace = self
            .scenario_repo
            .find_by_id(scenario_id)?
            .ok_or_else(|| ScenarioEngineError::NotFound {
                entity: "情景",
                id: scenario_id.to_string(),
            })?;

        if !workspace.is_snapshot_complete() {
            return Err(ScenarioEngineError::SnapshotIncomplete {
                scenario_id: scenario_id.to_string(),
                progress: workspace.creation_progress,
            });
        }
        if !workspace.status.is_editable() {
            return Err(ScenarioEngineError::NotEditable {
                scenario_id: scenario_id.to_string(),
                status: workspace.status,
            });
        }

        let mut line = self
            .scenario_repo
            .find_line(scenario_id, &request.line_id)?
            .ok_or_else(|| ScenarioEngineError::NotFound {
                entity: "情景明细",
                id: request.line_id.clone(),
            })?;

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let previous_volume = line.scenario_volume;
        if request.new_volume > previous_volume && reason.is_none() {
            return Err(ScenarioEngineError::JustificationRequired {
                line_id: line.line_id.clone(),
                current_volume: previous_volume,
                new_volume: request.new_volume,
            });
        }
        // 未填写新理由时沿用上次锁定时的理由
        let reason = reason.or_else(|| line.adjustment.reason().map(str::to_string));

        line.scenario_volume = request.new_volume;
        line.scenario_sessions =
            scale_sessions(line.baseline_sessions, line.baseline_volume, request.new_volume);
        line.scenario_cost = request.new_volume as f64 * line.baseline_cost_per_participant;
        line.is_cut = request.new_volume < line.baseline_volume;
        line.adjustment = LineAdjustment::Locked {
            reason: reason.clone(),
            adjusted_by: request.actor.clone(),
            adjusted_at: chrono::Local::now().naive_local(),
        };

        let (revision, totals) =
            self.scenario_repo
                .commit_adjustment(scenario_id, workspace.revision, &line)?;

        let log = ActionLog::new(
            Some(scenario_id.to_string()),
            ActionType::LocalAdjustment,
            &request.actor,
        )
        .with_payload(&json!({
            "line_id": line.line_id,
            "line_no": line.line_no,
            "previous_volume": previous_volume,
            "new_volume": line.scenario_volume,
            "new_cost": line.scenario_cost,
            "reason": reason,
        }));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("写入局部调整审计日志失败: {}", e);
        }

        tracing::info!(
            scenario_id = %scenario_id,
            line_id = %line.line_id,
            previous_volume,
            new_volume = line.scenario_volume,
            "明细已调整并锁定"
        );

        Ok(AdjustLineResult {
            scenario_id: scenario_id.to_string(),
            line_id: line.line_id,
            previous_volume,
            new_volume: line.scenario_volume,
            new_sessions: line.scenario_sessions,
            new_cost: line.scenario_cost,
            scenario_total_cost: totals.scenario_total_cost,
            scenario_total_participants: totals.scenario_total_participants,
            revision,
        })
    }
}
