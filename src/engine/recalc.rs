// ==========================================
// 培训管理系统 - 情景重算引擎
// ==========================================
// 红线: 锁定明细不可被系统调整
// 红线: 整次重算要么全部生效，要么不生效
// ==========================================
// 职责: 读取情景 -> 分配引擎 -> 单事务提交 -> 审计
// 并发: 进程内情景锁 + revision 乐观锁
// ==========================================

use crate::config::{ConfigManager, ScenarioConfigReader};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::levers::LeverConfig;
use crate::domain::types::CutTraversal;
use crate::engine::allocation::{AllocationEngine, AllocationWarning, LineDisposition};
use crate::engine::error::{EngineResult, ScenarioEngineError};
use crate::engine::scenario_lock::{with_scenario_lock, ScenarioLockRegistry};
use crate::repository::{ActionLogRepository, ScenarioRepository};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// RecalcResult - 重算结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalcResult {
    pub scenario_id: String,
    pub total_cost: f64,                 // 情景总成本
    pub total_participants: i64,         // 情景总人数
    pub items_updated: usize,            // 引擎写入的明细数（不含锁定）
    pub target_budget: Option<f64>,      // 本次目标预算
    pub locked_count: usize,
    pub excluded_count: usize,
    pub protected_count: usize,
    pub clamped_count: usize,
    pub traversal: CutTraversal,
    pub warnings: Vec<AllocationWarning>,
    pub revision: i32,                   // 提交后的 revision
    pub recalculated_at: NaiveDateTime,
}

// ==========================================
// RecalcEngine - 重算引擎
// ==========================================
pub struct RecalcEngine {
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
    locks: Arc<ScenarioLockRegistry>,
    allocator: AllocationEngine,
}

impl RecalcEngine {
    pub fn new(
        scenario_repo: Arc<ScenarioRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
        locks: Arc<ScenarioLockRegistry>,
    ) -> Self {
        Self {
            scenario_repo,
            action_log_repo,
            config_manager,
            locks,
            allocator: AllocationEngine::new(),
        }
    }

    /// 重算情景
    ///
    /// # 参数
    /// - `levers`: 本次杠杆；None 时沿用工作区上次保存的杠杆（无则为默认值）
    /// - `actor`: 操作人
    ///
    /// # 前置条件
    /// - 情景存在、快照完整、状态为 DRAFT / UNDER_REVIEW
    #[instrument(skip(self, scenario_id, levers, actor), fields(scenario_id = %scenario_id, actor = %actor))]
    pub fn recalculate(
        &self,
        scenario_id: &str,
        levers: Option<LeverConfig>,
        actor: &str,
    ) -> EngineResult<RecalcResult> {
        with_scenario_lock(&self.locks, scenario_id, || {
            self.recalculate_locked(scenario_id, levers, actor)
        })
    }

    fn recalculate_locked(
        &self,
        scenario_id: &str,
        levers: Option<LeverConfig>,
        actor: &str,
    ) -> EngineResult<RecalcResult> {
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

        // 1. 杠杆: 显式传入优先，否则沿用上次
        let levers = levers
            .or_else(|| workspace.levers.clone())
            .unwrap_or_default();
        levers.validate()?;

        let traversal = self.config_manager.get_cut_traversal().unwrap_or_else(|e| {
            tracing::warn!("读取削减遍历策略失败: {}, 使用 PERSISTED", e);
            CutTraversal::Persisted
        });

        // 2. 分配
        let lines = self.scenario_repo.find_lines(scenario_id)?;
        let outcome = self.allocator.allocate(&lines, &levers, traversal);

        if !outcome.warnings.is_empty() {
            tracing::warn!(
                scenario_id = %scenario_id,
                warnings = outcome.warnings.len(),
                "重算过程中存在数据质量问题"
            );
        }

        // 3. 单事务提交（revision 不一致则整体回滚）
        let recalculated_at = chrono::Local::now().naive_local();
        let revision = self.scenario_repo.commit_allocation(
            scenario_id,
            workspace.revision,
            &outcome.lines,
            &levers,
            recalculated_at,
        )?;

        let result = RecalcResult {
            scenario_id: scenario_id.to_string(),
            total_cost: outcome.totals.scenario_total_cost,
            total_participants: outcome.totals.scenario_total_participants,
            items_updated: outcome.items_updated,
            target_budget: outcome.target_budget,
            locked_count: outcome.count(LineDisposition::Locked),
            excluded_count: outcome.count(LineDisposition::Excluded),
            protected_count: outcome.count(LineDisposition::Protected),
            clamped_count: outcome.count(LineDisposition::Clamped),
            traversal,
            warnings: outcome.warnings,
            revision,
            recalculated_at,
        };

        // 4. 审计（提交后写入，失败只告警）
        let config_snapshot = self
            .config_manager
            .get_config_snapshot()
            .ok()
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok());
        let log = ActionLog::new(Some(scenario_id.to_string()), ActionType::Recalculate, actor)
            .with_payload(&json!({
                "levers": levers,
                "traversal": traversal,
                "target_budget": result.target_budget,
                "total_cost": result.total_cost,
                "total_participants": result.total_participants,
                "items_updated": result.items_updated,
                "clamped_count": result.clamped_count,
                "warnings": result.warnings.len(),
                "config_snapshot": config_snapshot,
            }))
            .with_detail(format!(
                "重算完成: 成本={:.2}, 人数={}",
                result.total_cost, result.total_participants
            ));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("写入重算审计日志失败: {}", e);
        }

        tracing::info!(
            scenario_id = %scenario_id,
            total_cost = result.total_cost,
            total_participants = result.total_participants,
            items_updated = result.items_updated,
            revision = result.revision,
            "情景重算完成"
        );

        Ok(result)
    }
}
