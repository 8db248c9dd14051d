// ==========================================
// 培训管理系统 - 计划快照复制
// ==========================================
// 红线: 只读基准计划，不修改基准
// 红线: 失败时 creation_progress = -1，状态回到 DRAFT（可查看、可删除）
// ==========================================
// 职责: 建立情景工作区，并按批复制基准明细
// 调度: 有 Tokio 运行时则后台执行（fire and forget），否则同步执行
// ==========================================

use crate::config::{ConfigManager, ScenarioConfigReader};
use crate::config::config_manager::DEFAULT_SNAPSHOT_BATCH_SIZE;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::plan::TrainingPlanLine;
use crate::domain::scenario::{
    cost_per_participant, LineAdjustment, ScenarioLineItem, ScenarioTotals, ScenarioWorkspace,
    MAX_LINE_VOLUME,
};
use crate::domain::types::{ScenarioStatus, VisibilityScope};
use crate::engine::error::{EngineResult, ScenarioEngineError};
use crate::repository::{ActionLogRepository, ScenarioRepository, TrainingPlanRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// 创建情景请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScenarioRequest {
    pub basis_plan_id: String,
    pub basis_plan_version: i32,
    pub name: String,
    pub description: Option<String>,
    pub visibility_scope: Option<VisibilityScope>,
    pub owner: String,
}

/// 快照复制报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub scenario_id: String,
    pub lines_copied: usize,
    pub batches: usize,
    pub totals: ScenarioTotals,
}

/// 快照复制的执行方式
#[derive(Debug)]
pub enum SnapshotLaunch {
    /// 已提交到后台线程，调用方轮询 creation_progress
    Background,
    /// 同步执行完毕
    Inline(EngineResult<SnapshotReport>),
}

// ==========================================
// SnapshotBuilder - 快照复制器
// ==========================================
pub struct SnapshotBuilder {
    plan_repo: Arc<TrainingPlanRepository>,
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
}

impl SnapshotBuilder {
    pub fn new(
        plan_repo: Arc<TrainingPlanRepository>,
        scenario_repo: Arc<ScenarioRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            plan_repo,
            scenario_repo,
            action_log_repo,
            config_manager,
        }
    }

    /// 建立工作区（状态 CREATING，进度 0），并记录 `created` 审计
    ///
    /// 基准计划必须存在，且版本号与计划当前版本一致。
    #[instrument(skip(self, request), fields(basis_plan_id = %request.basis_plan_id))]
    pub fn create_workspace(
        &self,
        request: &CreateScenarioRequest,
    ) -> EngineResult<ScenarioWorkspace> {
        let plan = self
            .plan_repo
            .find_by_id(&request.basis_plan_id)?
            .ok_or_else(|| ScenarioEngineError::NotFound {
                entity: "培训计划",
                id: request.basis_plan_id.clone(),
            })?;

        if plan.version != request.basis_plan_version {
            return Err(ScenarioEngineError::Validation(format!(
                "基准计划版本不匹配: plan_id={}, 当前版本={}, 请求版本={}",
                plan.plan_id, plan.version, request.basis_plan_version
            )));
        }

        let now = chrono::Local::now().naive_local();
        let workspace = ScenarioWorkspace {
            scenario_id: Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            status: ScenarioStatus::Creating,
            owner: request.owner.clone(),
            visibility_scope: request.visibility_scope.unwrap_or_default(),
            basis_plan_id: plan.plan_id.clone(),
            basis_plan_version: plan.version,
            baseline_total_cost: 0.0,
            scenario_total_cost: 0.0,
            baseline_total_participants: 0,
            scenario_total_participants: 0,
            levers: None,
            creation_progress: 0,
            promoted_to_plan_id: None,
            last_recalculation_at: None,
            created_at: now,
            updated_at: now,
            revision: 1,
        };
        self.scenario_repo.insert_workspace(&workspace)?;

        let log = ActionLog::new(
            Some(workspace.scenario_id.clone()),
            ActionType::Created,
            &request.owner,
        )
        .with_payload(&json!({
            "basis_plan_id": workspace.basis_plan_id,
            "basis_plan_version": workspace.basis_plan_version,
            "name": workspace.name,
        }));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("写入创建审计日志失败: {}", e);
        }

        tracing::info!(scenario_id = %workspace.scenario_id, "情景工作区已建立，等待快照复制");
        Ok(workspace)
    }

    /// 启动快照复制
    ///
    /// 当前线程处于 Tokio 运行时内时提交到阻塞线程池后立即返回；否则同步执行。
    pub fn launch(self: &Arc<Self>, workspace: &ScenarioWorkspace, actor: &str) -> SnapshotLaunch {
        let batch_size = self.config_manager.get_snapshot_batch_size().unwrap_or_else(|e| {
            tracing::warn!("读取快照批大小失败: {}, 使用默认值", e);
            DEFAULT_SNAPSHOT_BATCH_SIZE
        });

        let scenario_id = workspace.scenario_id.clone();
        let plan_id = workspace.basis_plan_id.clone();
        let actor = actor.to_string();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let builder = Arc::clone(self);
            handle.spawn_blocking(move || {
                // 结果已写入工作区与审计日志
                let _ = builder.run(&scenario_id, &plan_id, batch_size, &actor);
            });
            SnapshotLaunch::Background
        } else {
            SnapshotLaunch::Inline(self.run(&scenario_id, &plan_id, batch_size, &actor))
        }
    }

    /// 执行快照复制并记录结果（成功 -> DRAFT/100，失败 -> DRAFT/-1）
    #[instrument(skip(self, actor))]
    pub fn run(
        &self,
        scenario_id: &str,
        basis_plan_id: &str,
        batch_size: usize,
        actor: &str,
    ) -> EngineResult<SnapshotReport> {
        match self.copy_lines(scenario_id, basis_plan_id, batch_size) {
            Ok(report) => {
                let log = ActionLog::new(
                    Some(scenario_id.to_string()),
                    ActionType::SnapshotCompleted,
                    actor,
                )
                .with_payload(&json!({
                    "lines_copied": report.lines_copied,
                    "batches": report.batches,
                    "baseline_total_cost": report.totals.baseline_total_cost,
                    "baseline_total_participants": report.totals.baseline_total_participants,
                }));
                if let Err(e) = self.action_log_repo.insert(&log) {
                    tracing::warn!("写入快照完成审计日志失败: {}", e);
                }

                tracing::info!(
                    scenario_id = %scenario_id,
                    lines_copied = report.lines_copied,
                    batches = report.batches,
                    "快照复制完成"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!(scenario_id = %scenario_id, "快照复制失败: {}", err);

                if let Err(e) = self.scenario_repo.fail_snapshot(scenario_id) {
                    tracing::error!(scenario_id = %scenario_id, "标记快照失败状态失败: {}", e);
                }

                let log = ActionLog::new(
                    Some(scenario_id.to_string()),
                    ActionType::SnapshotFailed,
                    actor,
                )
                .with_detail(err.to_string());
                if let Err(e) = self.action_log_repo.insert(&log) {
                    tracing::warn!("写入快照失败审计日志失败: {}", e);
                }

                Err(err)
            }
        }
    }

    /// 分批复制明细，每批后更新进度；全部完成后写入聚合值
    fn copy_lines(
        &self,
        scenario_id: &str,
        basis_plan_id: &str,
        batch_size: usize,
    ) -> EngineResult<SnapshotReport> {
        let batch_size = batch_size.max(1);
        let total = self.plan_repo.count_lines(basis_plan_id)?;

        let mut totals = ScenarioTotals::default();
        let mut copied: i64 = 0;
        let mut batches = 0usize;

        while copied < total {
            let page = self
                .plan_repo
                .find_lines_paged(basis_plan_id, batch_size as i64, copied)?;
            if page.is_empty() {
                break;
            }

            let items = page
                .iter()
                .map(|source| to_scenario_line(scenario_id, source))
                .collect::<EngineResult<Vec<_>>>()?;
            self.scenario_repo.insert_lines_batch(&items)?;

            for item in &items {
                totals.baseline_total_cost += item.baseline_cost;
                totals.baseline_total_participants += item.baseline_volume;
            }
            copied += items.len() as i64;
            batches += 1;

            let progress = ((copied as f64 / total as f64) * 100.0).round() as i32;
            self.scenario_repo.update_progress(scenario_id, progress)?;
            tracing::debug!(scenario_id = %scenario_id, copied, total, progress, "快照批次完成");
        }

        // 创建时情景 == 基准
        totals.scenario_total_cost = totals.baseline_total_cost;
        totals.scenario_total_participants = totals.baseline_total_participants;
        self.scenario_repo.complete_snapshot(scenario_id, &totals)?;

        Ok(SnapshotReport {
            scenario_id: scenario_id.to_string(),
            lines_copied: copied as usize,
            batches,
            totals,
        })
    }
}

/// 基准明细 -> 情景明细（校验基准数据）
fn to_scenario_line(
    scenario_id: &str,
    source: &TrainingPlanLine,
) -> EngineResult<ScenarioLineItem> {
    if source.volume < 0 || source.sessions < 0 {
        return Err(ScenarioEngineError::Validation(format!(
            "基准明细人数/班次为负: line_no={}, volume={}, sessions={}",
            source.line_no, source.volume, source.sessions
        )));
    }
    if source.volume > MAX_LINE_VOLUME {
        return Err(ScenarioEngineError::Validation(format!(
            "基准明细人数超过上限{}: line_no={}, volume={}",
            MAX_LINE_VOLUME, source.line_no, source.volume
        )));
    }
    if !source.cost.is_finite() || source.cost < 0.0 {
        return Err(ScenarioEngineError::Validation(format!(
            "基准明细成本无效: line_no={}, cost={}",
            source.line_no, source.cost
        )));
    }

    Ok(ScenarioLineItem {
        line_id: Uuid::new_v4().to_string(),
        scenario_id: scenario_id.to_string(),
        line_no: source.line_no,
        source_line_id: Some(source.line_id.clone()),
        course_id: source.course_id.clone(),
        course_name: source.course_name.clone(),
        entity_id: source.entity_id.clone(),
        category_id: source.category_id.clone(),
        baseline_volume: source.volume,
        baseline_sessions: source.sessions,
        baseline_cost: source.cost,
        baseline_cost_per_participant: cost_per_participant(source.cost, source.volume),
        scenario_volume: source.volume,
        scenario_sessions: source.sessions,
        scenario_cost: source.cost,
        priority_band: source.priority_band,
        is_protected: source.is_protected,
        is_abroad: source.is_abroad,
        adjustment: LineAdjustment::Engine,
        is_cut: false,
    })
}
