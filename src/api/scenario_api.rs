// ==========================================
// 培训管理系统 - 预算情景 API
// ==========================================
// 职责: 情景创建、重算、局部调整、审批流转、采纳、导出
// 红线: 所有写操作先校验输入，校验失败不产生任何写入
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, ScenarioConfigReader};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::levers::LeverConfig;
use crate::domain::scenario::{ScenarioLineItem, ScenarioWorkspace, MAX_LINE_VOLUME};
use crate::domain::types::{ExportColumnGroup, PriorityBand, ScenarioStatus, VisibilityScope};
use crate::engine::{
    summarize, AdjustLineRequest, AdjustLineResult, AdjustmentHandler, CreateScenarioRequest,
    ExportRequest, ExportService, ExportTable, LifecycleService, PromoteRequest, PromoteResult,
    PromotionHandler, RecalcEngine, RecalcResult, ScenarioSummary, SnapshotBuilder,
    SnapshotLaunch,
};
use crate::repository::{
    ActionLogRepository, AuditTrailQuery, LineItemQuery, ScenarioQuery, ScenarioRepository,
};

/// 单页最大条数
pub const MAX_PAGE_SIZE: i64 = 1000;

/// 情景列表分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioPage {
    pub items: Vec<ScenarioWorkspace>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// 明细列表分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemPage {
    pub items: Vec<ScenarioLineItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// 审计轨迹分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrailPage {
    pub items: Vec<ActionLog>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// ==========================================
// ScenarioApi - 预算情景 API
// ==========================================

/// 预算情景API
///
/// 职责：
/// 1. 情景管理（创建、查询、删除）
/// 2. 重算与局部调整
/// 3. 审批流转（提交审核、批准、归档）
/// 4. 采纳为新计划、导出明细、摘要与审计追踪
pub struct ScenarioApi {
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config_manager: Arc<ConfigManager>,
    snapshot_builder: Arc<SnapshotBuilder>,
    recalc_engine: Arc<RecalcEngine>,
    adjustment_handler: Arc<AdjustmentHandler>,
    promotion_handler: Arc<PromotionHandler>,
    lifecycle: Arc<LifecycleService>,
    export_service: Arc<ExportService>,
}

impl ScenarioApi {
    /// 创建新的ScenarioApi实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenario_repo: Arc<ScenarioRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config_manager: Arc<ConfigManager>,
        snapshot_builder: Arc<SnapshotBuilder>,
        recalc_engine: Arc<RecalcEngine>,
        adjustment_handler: Arc<AdjustmentHandler>,
        promotion_handler: Arc<PromotionHandler>,
        lifecycle: Arc<LifecycleService>,
        export_service: Arc<ExportService>,
    ) -> Self {
        Self {
            scenario_repo,
            action_log_repo,
            config_manager,
            snapshot_builder,
            recalc_engine,
            adjustment_handler,
            promotion_handler,
            lifecycle,
            export_service,
        }
    }

    // ==========================================
    // 情景管理接口
    // ==========================================

    /// 创建情景（建立工作区并启动快照复制）
    ///
    /// # 返回
    /// - 有 Tokio 运行时: 立即返回 CREATING 状态的工作区，调用方轮询 creation_progress
    /// - 无运行时: 快照同步完成后返回最新工作区（失败时 creation_progress = -1）
    pub fn create_scenario(
        &self,
        basis_plan_id: &str,
        basis_plan_version: i32,
        name: &str,
        description: Option<String>,
        visibility_scope: Option<VisibilityScope>,
        owner: &str,
    ) -> ApiResult<ScenarioWorkspace> {
        if basis_plan_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("基准计划ID不能为空".to_string()));
        }
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("情景名称不能为空".to_string()));
        }
        if owner.trim().is_empty() {
            return Err(ApiError::InvalidInput("创建人不能为空".to_string()));
        }
        if basis_plan_version < 1 {
            return Err(ApiError::InvalidInput(format!(
                "基准计划版本号必须大于0: {}",
                basis_plan_version
            )));
        }

        let request = CreateScenarioRequest {
            basis_plan_id: basis_plan_id.trim().to_string(),
            basis_plan_version,
            name: name.to_string(),
            description,
            visibility_scope,
            owner: owner.trim().to_string(),
        };
        let workspace = self.snapshot_builder.create_workspace(&request)?;

        match self.snapshot_builder.launch(&workspace, &request.owner) {
            SnapshotLaunch::Background => Ok(workspace),
            SnapshotLaunch::Inline(result) => {
                if let Err(e) = result {
                    // 失败已记录在工作区 (progress = -1)，调用方通过工作区状态感知
                    tracing::warn!(scenario_id = %workspace.scenario_id, "快照复制失败: {}", e);
                }
                self.get_scenario(&workspace.scenario_id)
            }
        }
    }

    /// 查询情景
    pub fn get_scenario(&self, scenario_id: &str) -> ApiResult<ScenarioWorkspace> {
        if scenario_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("情景ID不能为空".to_string()));
        }
        self.scenario_repo
            .find_by_id(scenario_id)?
            .ok_or_else(|| ApiError::NotFound(format!("情景(id={})不存在", scenario_id)))
    }

    /// 分页查询情景列表
    pub fn list_scenarios(
        &self,
        status: Option<ScenarioStatus>,
        owner: Option<String>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<ScenarioPage> {
        validate_page(limit, offset)?;

        let query = ScenarioQuery {
            status,
            owner: owner.filter(|o| !o.trim().is_empty()),
            basis_plan_id: None,
            limit: Some(limit),
            offset: Some(offset),
        };
        let items = self.scenario_repo.list(&query)?;
        let total = self.scenario_repo.count(&query)?;

        Ok(ScenarioPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// 分页查询情景明细（按持久化顺序）
    pub fn list_line_items(
        &self,
        scenario_id: &str,
        cut_only: bool,
        priority_band: Option<PriorityBand>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<LineItemPage> {
        validate_page(limit, offset)?;
        let workspace = self.get_scenario(scenario_id)?;

        let query = LineItemQuery {
            cut_only,
            priority_band,
            limit: Some(limit),
            offset: Some(offset),
        };
        let items = self
            .scenario_repo
            .find_lines_filtered(&workspace.scenario_id, &query)?;
        let total = self
            .scenario_repo
            .count_lines_filtered(&workspace.scenario_id, &query)?;

        Ok(LineItemPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// 删除情景（仅 DRAFT）
    pub fn delete_scenario(&self, scenario_id: &str, actor: &str) -> ApiResult<()> {
        validate_ids(scenario_id, actor)?;
        self.lifecycle.delete(scenario_id, actor)?;
        Ok(())
    }

    // ==========================================
    // 重算与调整接口
    // ==========================================

    /// 按杠杆重算情景
    ///
    /// # 参数
    /// - levers: None 时沿用上次保存的杠杆
    pub fn recalculate(
        &self,
        scenario_id: &str,
        levers: Option<LeverConfig>,
        actor: &str,
    ) -> ApiResult<RecalcResult> {
        validate_ids(scenario_id, actor)?;
        if let Some(levers) = &levers {
            levers.validate().map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        }
        Ok(self.recalc_engine.recalculate(scenario_id, levers, actor)?)
    }

    /// 从 JSON 文本解析杠杆后重算
    pub fn recalculate_with_json(
        &self,
        scenario_id: &str,
        levers_json: &str,
        actor: &str,
    ) -> ApiResult<RecalcResult> {
        let levers: LeverConfig = serde_json::from_str(levers_json)
            .map_err(|e| ApiError::InvalidInput(format!("杠杆JSON解析失败: {}", e)))?;
        self.recalculate(scenario_id, Some(levers), actor)
    }

    /// 局部调整单条明细（调整后锁定，重算不再触碰）
    pub fn adjust_line(
        &self,
        scenario_id: &str,
        line_id: &str,
        new_volume: i64,
        reason: Option<String>,
        actor: &str,
    ) -> ApiResult<AdjustLineResult> {
        validate_ids(scenario_id, actor)?;
        if line_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("明细ID不能为空".to_string()));
        }
        if !(0..=MAX_LINE_VOLUME).contains(&new_volume) {
            return Err(ApiError::InvalidInput(format!(
                "调整人数必须在0-{}之间: {}",
                MAX_LINE_VOLUME, new_volume
            )));
        }

        let request = AdjustLineRequest {
            scenario_id: scenario_id.to_string(),
            line_id: line_id.to_string(),
            new_volume,
            reason: reason.filter(|r| !r.trim().is_empty()),
            actor: actor.to_string(),
        };
        Ok(self.adjustment_handler.adjust_line(&request)?)
    }

    // ==========================================
    // 审批流转接口
    // ==========================================

    /// 提交审核 (DRAFT -> UNDER_REVIEW)
    pub fn submit_for_review(&self, scenario_id: &str, actor: &str) -> ApiResult<ScenarioWorkspace> {
        self.transition(scenario_id, ScenarioStatus::UnderReview, actor)
    }

    /// 退回草稿 (UNDER_REVIEW -> DRAFT)
    pub fn return_to_draft(&self, scenario_id: &str, actor: &str) -> ApiResult<ScenarioWorkspace> {
        self.transition(scenario_id, ScenarioStatus::Draft, actor)
    }

    /// 批准 (UNDER_REVIEW -> APPROVED)
    pub fn approve(&self, scenario_id: &str, actor: &str) -> ApiResult<ScenarioWorkspace> {
        self.transition(scenario_id, ScenarioStatus::Approved, actor)
    }

    /// 归档（任意未采纳状态）
    pub fn archive(&self, scenario_id: &str, actor: &str) -> ApiResult<ScenarioWorkspace> {
        self.transition(scenario_id, ScenarioStatus::Archived, actor)
    }

    fn transition(
        &self,
        scenario_id: &str,
        next: ScenarioStatus,
        actor: &str,
    ) -> ApiResult<ScenarioWorkspace> {
        validate_ids(scenario_id, actor)?;
        Ok(self.lifecycle.transition(scenario_id, next, actor)?)
    }

    // ==========================================
    // 采纳与导出接口
    // ==========================================

    /// 采纳情景为新的培训计划
    pub fn promote(
        &self,
        scenario_id: &str,
        new_plan_name: &str,
        description: Option<String>,
        actor: &str,
    ) -> ApiResult<PromoteResult> {
        validate_ids(scenario_id, actor)?;
        if new_plan_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("新计划名称不能为空".to_string()));
        }

        let request = PromoteRequest {
            scenario_id: scenario_id.to_string(),
            new_plan_name: new_plan_name.trim().to_string(),
            description,
            actor: actor.to_string(),
        };
        Ok(self.promotion_handler.promote(&request)?)
    }

    /// 导出情景明细为表格
    ///
    /// # 参数
    /// - groups: None 时使用配置 `scenario/export_default_groups`
    pub fn export_lines(
        &self,
        scenario_id: &str,
        cut_only: bool,
        groups: Option<Vec<ExportColumnGroup>>,
        actor: &str,
    ) -> ApiResult<ExportTable> {
        validate_ids(scenario_id, actor)?;

        let groups = match groups {
            Some(groups) => groups,
            None => self
                .config_manager
                .get_export_default_groups()
                .unwrap_or_else(|e| {
                    tracing::warn!("读取导出默认列组失败: {}, 使用全部列组", e);
                    ExportColumnGroup::ALL.to_vec()
                }),
        };

        let request = ExportRequest {
            scenario_id: scenario_id.to_string(),
            cut_only,
            groups,
            actor: actor.to_string(),
        };
        Ok(self.export_service.export_lines(&request)?)
    }

    /// 导出情景明细为 CSV 文本
    pub fn export_csv(
        &self,
        scenario_id: &str,
        cut_only: bool,
        groups: Option<Vec<ExportColumnGroup>>,
        actor: &str,
    ) -> ApiResult<String> {
        let table = self.export_lines(scenario_id, cut_only, groups, actor)?;
        Ok(table.to_csv()?)
    }

    // ==========================================
    // 报表接口
    // ==========================================

    /// 情景摘要（按优先级分档）
    pub fn summarize(&self, scenario_id: &str) -> ApiResult<ScenarioSummary> {
        let workspace = self.get_scenario(scenario_id)?;
        let lines = self.scenario_repo.find_lines(&workspace.scenario_id)?;
        Ok(summarize(&workspace, &lines))
    }

    /// 审计追踪（按时间正序）
    pub fn list_audit_trail(&self, scenario_id: &str) -> ApiResult<Vec<ActionLog>> {
        if scenario_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("情景ID不能为空".to_string()));
        }
        Ok(self
            .action_log_repo
            .find_trail(&AuditTrailQuery::for_scenario(scenario_id))?)
    }

    /// 审计追踪分页查询（可按操作类型/操作人过滤）
    ///
    /// 情景删除后日志仍可查询，因此不校验情景是否存在。
    pub fn list_audit_trail_page(
        &self,
        scenario_id: &str,
        action_type: Option<ActionType>,
        actor: Option<String>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<AuditTrailPage> {
        if scenario_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("情景ID不能为空".to_string()));
        }
        validate_page(limit, offset)?;

        let query = AuditTrailQuery {
            scenario_id: scenario_id.to_string(),
            action_type,
            actor: actor.filter(|a| !a.trim().is_empty()),
            limit: Some(limit),
            offset: Some(offset),
        };
        let total = self.action_log_repo.count_trail(&query)?;
        let items = self.action_log_repo.find_trail(&query)?;
        Ok(AuditTrailPage {
            items,
            total,
            limit,
            offset,
        })
    }
}

// ==========================================
// 参数校验
// ==========================================

fn validate_ids(scenario_id: &str, actor: &str) -> ApiResult<()> {
    if scenario_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("情景ID不能为空".to_string()));
    }
    if actor.trim().is_empty() {
        return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
    }
    Ok(())
}

fn validate_page(limit: i64, offset: i64) -> ApiResult<()> {
    if limit <= 0 || limit > MAX_PAGE_SIZE {
        return Err(ApiError::InvalidInput(format!(
            "limit必须在1-{}之间: {}",
            MAX_PAGE_SIZE, limit
        )));
    }
    if offset < 0 {
        return Err(ApiError::InvalidInput(format!("offset不能为负数: {}", offset)));
    }
    Ok(())
}
