// ==========================================
// 培训管理系统 - 情景摘要
// ==========================================
// 职责: 按优先级分档汇总基准/情景成本、人数与削减数量
// 红线: 纯函数，不访问数据库
// ==========================================

use crate::domain::scenario::{ScenarioLineItem, ScenarioWorkspace};
use crate::domain::types::{PriorityBand, ScenarioStatus};
use serde::{Deserialize, Serialize};

/// 单个分档的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSummary {
    pub priority_band: PriorityBand,
    pub line_count: usize,
    pub cut_count: usize,
    pub locked_count: usize,
    pub baseline_cost: f64,
    pub scenario_cost: f64,
    pub baseline_participants: i64,
    pub scenario_participants: i64,
}

impl BandSummary {
    fn empty(priority_band: PriorityBand) -> Self {
        Self {
            priority_band,
            line_count: 0,
            cut_count: 0,
            locked_count: 0,
            baseline_cost: 0.0,
            scenario_cost: 0.0,
            baseline_participants: 0,
            scenario_participants: 0,
        }
    }

    pub fn cost_delta(&self) -> f64 {
        self.scenario_cost - self.baseline_cost
    }
}

/// 情景摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub scenario_id: String,
    pub status: ScenarioStatus,
    pub revision: i32,
    pub baseline_total_cost: f64,
    pub scenario_total_cost: f64,
    pub baseline_total_participants: i64,
    pub scenario_total_participants: i64,
    /// 情景成本相对基准的节省（负数表示超出基准）
    pub savings: f64,
    /// 按 Critical > High > Medium > Low 排列，始终包含四个分档
    pub bands: Vec<BandSummary>,
}

impl ScenarioSummary {
    pub fn band(&self, band: PriorityBand) -> Option<&BandSummary> {
        self.bands.iter().find(|b| b.priority_band == band)
    }

    pub fn total_cut_count(&self) -> usize {
        self.bands.iter().map(|b| b.cut_count).sum()
    }
}

/// 汇总情景明细
///
/// 总计字段取工作区持久化的聚合值，分档字段按明细求和。
pub fn summarize(workspace: &ScenarioWorkspace, lines: &[ScenarioLineItem]) -> ScenarioSummary {
    let mut bands: Vec<BandSummary> = PriorityBand::ALL.iter().copied().map(BandSummary::empty).collect();

    for line in lines {
        let Some(entry) = bands.iter_mut().find(|b| b.priority_band == line.priority_band) else {
            continue;
        };
        entry.line_count += 1;
        if line.is_cut {
            entry.cut_count += 1;
        }
        if line.is_locally_adjusted() {
            entry.locked_count += 1;
        }
        entry.baseline_cost += line.baseline_cost;
        entry.scenario_cost += line.scenario_cost;
        entry.baseline_participants += line.baseline_volume;
        entry.scenario_participants += line.scenario_volume;
    }

    ScenarioSummary {
        scenario_id: workspace.scenario_id.clone(),
        status: workspace.status,
        revision: workspace.revision,
        baseline_total_cost: workspace.baseline_total_cost,
        scenario_total_cost: workspace.scenario_total_cost,
        baseline_total_participants: workspace.baseline_total_participants,
        scenario_total_participants: workspace.scenario_total_participants,
        savings: workspace.baseline_total_cost - workspace.scenario_total_cost,
        bands,
    }
}
