// ==========================================
// 培训管理系统 - 情景明细导出
// ==========================================
// 红线: 纯读取，不改变工作区状态（仅追加审计日志）
// 输出: 扁平表格 (ExportTable) / CSV 文本
// ==========================================

use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::scenario::ScenarioLineItem;
use crate::domain::types::ExportColumnGroup;
use crate::engine::error::{EngineResult, ScenarioEngineError};
use crate::repository::{ActionLogRepository, LineItemQuery, ScenarioRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// 标识列（始终输出）
const IDENTITY_HEADERS: [&str; 12] = [
    "line_no",
    "course_id",
    "course_name",
    "entity_id",
    "category_id",
    "priority_band",
    "is_protected",
    "is_abroad",
    "scenario_volume",
    "scenario_sessions",
    "is_cut",
    "is_locally_adjusted",
];

/// 导出请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub scenario_id: String,
    pub cut_only: bool,
    /// 按给定顺序输出（重复项忽略），空列表只输出标识列
    pub groups: Vec<ExportColumnGroup>,
    pub actor: String,
}

/// 扁平表格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    /// 序列化为 CSV（含表头）
    pub fn to_csv(&self) -> EngineResult<String> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| ScenarioEngineError::Export(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| ScenarioEngineError::Export(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ScenarioEngineError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ScenarioEngineError::Export(e.to_string()))
    }
}

/// 按列组构建表格
pub fn build_table(lines: &[ScenarioLineItem], groups: &[ExportColumnGroup]) -> ExportTable {
    let mut headers: Vec<String> = IDENTITY_HEADERS.iter().map(|h| h.to_string()).collect();
    for group in groups {
        headers.extend(group_headers(*group).iter().map(|h| h.to_string()));
    }

    let rows = lines
        .iter()
        .map(|line| {
            let mut row = vec![
                line.line_no.to_string(),
                line.course_id.clone(),
                line.course_name.clone(),
                line.entity_id.clone().unwrap_or_default(),
                line.category_id.clone().unwrap_or_default(),
                line.priority_band.to_db_str().to_string(),
                line.is_protected.to_string(),
                line.is_abroad.to_string(),
                line.scenario_volume.to_string(),
                line.scenario_sessions.to_string(),
                line.is_cut.to_string(),
                line.is_locally_adjusted().to_string(),
            ];
            for group in groups {
                row.extend(group_values(*group, line));
            }
            row
        })
        .collect();

    ExportTable { headers, rows }
}

fn group_headers(group: ExportColumnGroup) -> &'static [&'static str] {
    match group {
        ExportColumnGroup::Baseline => &["baseline_volume", "baseline_sessions", "baseline_cost"],
        ExportColumnGroup::Deltas => &["volume_delta", "cost_delta", "local_adjustment_reason"],
        ExportColumnGroup::Costs => &["baseline_cost_per_participant", "scenario_cost"],
    }
}

fn group_values(group: ExportColumnGroup, line: &ScenarioLineItem) -> Vec<String> {
    match group {
        ExportColumnGroup::Baseline => vec![
            line.baseline_volume.to_string(),
            line.baseline_sessions.to_string(),
            format!("{:.2}", line.baseline_cost),
        ],
        ExportColumnGroup::Deltas => vec![
            line.volume_delta().to_string(),
            format!("{:.2}", line.cost_delta()),
            line.adjustment.reason().unwrap_or_default().to_string(),
        ],
        ExportColumnGroup::Costs => vec![
            format!("{:.2}", line.baseline_cost_per_participant),
            format!("{:.2}", line.scenario_cost),
        ],
    }
}

// ==========================================
// ExportService - 导出服务
// ==========================================
pub struct ExportService {
    scenario_repo: Arc<ScenarioRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl ExportService {
    pub fn new(
        scenario_repo: Arc<ScenarioRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            scenario_repo,
            action_log_repo,
        }
    }

    #[instrument(skip(self, request), fields(scenario_id = %request.scenario_id, cut_only = request.cut_only))]
    pub fn export_lines(&self, request: &ExportRequest) -> EngineResult<ExportTable> {
        let workspace = self
            .scenario_repo
            .find_by_id(&request.scenario_id)?
            .ok_or_else(|| ScenarioEngineError::NotFound {
                entity: "情景",
                id: request.scenario_id.clone(),
            })?;

        let lines = self.scenario_repo.find_lines_filtered(
            &workspace.scenario_id,
            &LineItemQuery {
                cut_only: request.cut_only,
                ..Default::default()
            },
        )?;

        let mut groups: Vec<ExportColumnGroup> = Vec::new();
        for group in &request.groups {
            if !groups.contains(group) {
                groups.push(*group);
            }
        }
        let table = build_table(&lines, &groups);

        let log = ActionLog::new(
            Some(workspace.scenario_id.clone()),
            ActionType::Export,
            &request.actor,
        )
        .with_payload(&json!({
            "cut_only": request.cut_only,
            "groups": groups,
            "rows": table.rows.len(),
        }));
        if let Err(e) = self.action_log_repo.insert(&log) {
            tracing::warn!("写入导出审计日志失败: {}", e);
        }

        tracing::info!(
            scenario_id = %workspace.scenario_id,
            rows = table.rows.len(),
            "情景明细已导出"
        );
        Ok(table)
    }
}
