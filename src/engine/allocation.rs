// ==========================================
// 培训管理系统 - 预算分配引擎
// ==========================================
// 红线: 锁定明细不可被引擎修改
// 红线: 引擎不拼 SQL, 不读写数据库
// ==========================================
// 职责: 单遍、确定性的贪心预算分配
// 输入: 按 line_no 排列的情景明细 + 杠杆配置 + 遍历策略
// 输出: 更新后的明细 + 聚合值 + 数据质量告警
// ==========================================

use crate::domain::levers::LeverConfig;
use crate::domain::scenario::{scale_sessions, ScenarioLineItem, ScenarioTotals};
use crate::domain::types::CutTraversal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::instrument;

/// 预算比较容差（抵消浮点累加误差）
const COST_EPSILON: f64 = 1e-9;

// ==========================================
// LineDisposition - 单行处理结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineDisposition {
    Locked,    // 人工锁定，原样保留并计入预算台账
    Excluded,  // 分档被排除，清零
    Protected, // 受保护，保持基准
    Retained,  // 预算内，保持基准
    Clamped,   // 超出预算，按剩余额度截断
}

/// 数据质量告警（人均成本缺失等退化输入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationWarning {
    pub line_id: String,
    pub line_no: i32,
    pub message: String,
}

// ==========================================
// AllocationOutcome - 分配结果
// ==========================================
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// 更新后的明细（保持输入顺序，即 line_no 顺序）
    pub lines: Vec<ScenarioLineItem>,
    /// 与 lines 一一对应的处理结果
    pub dispositions: Vec<LineDisposition>,
    /// 全部明细求和（含锁定/排除明细）
    pub totals: ScenarioTotals,
    pub target_budget: Option<f64>,
    /// 非锁定明细数（引擎实际写入的行数）
    pub items_updated: usize,
    pub warnings: Vec<AllocationWarning>,
}

impl AllocationOutcome {
    pub fn count(&self, disposition: LineDisposition) -> usize {
        self.dispositions.iter().filter(|d| **d == disposition).count()
    }
}

// ==========================================
// AllocationEngine - 分配引擎
// ==========================================
#[derive(Debug, Default)]
pub struct AllocationEngine {
    // 无状态引擎
}

impl AllocationEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// 执行一次分配
    ///
    /// 规则:
    /// 1) 锁定明细: 不处理，当前 scenario_cost 计入台账
    /// 2) 分档被排除: 人数/班次/成本清零，is_cut = true，不计入台账
    /// 3) 其余明细: 从基准开始；未受保护且超出全局或实体剩余额度时，
    ///    截断为 floor(剩余额度 / 人均成本)
    /// 4) 台账 += 本行成本
    ///
    /// 调用方负责事先校验杠杆 (`LeverConfig::validate`)。
    #[instrument(skip(self, lines, levers, traversal), fields(
        lines_count = lines.len(),
        traversal = traversal.to_db_str()
    ))]
    pub fn allocate(
        &self,
        lines: &[ScenarioLineItem],
        levers: &LeverConfig,
        traversal: CutTraversal,
    ) -> AllocationOutcome {
        let baseline_total_cost: f64 = lines.iter().map(|l| l.baseline_cost).sum();
        let target_budget = levers.target_budget(baseline_total_cost);

        // 实体级目标基于该实体的基准成本合计
        let mut entity_baseline: HashMap<&str, f64> = HashMap::new();
        for line in lines {
            if let Some(entity_id) = line.entity_id.as_deref() {
                *entity_baseline.entry(entity_id).or_insert(0.0) += line.baseline_cost;
            }
        }
        let entity_targets: HashMap<&str, f64> = entity_baseline
            .iter()
            .filter_map(|(entity_id, base)| {
                levers
                    .entity_target(entity_id, *base)
                    .map(|target| (*entity_id, target))
            })
            .collect();

        let order = self.traversal_order(lines, levers, traversal);

        let mut updated: Vec<ScenarioLineItem> = lines.to_vec();
        let mut dispositions = vec![LineDisposition::Retained; lines.len()];
        let mut warnings = Vec::new();
        let mut running_cost = 0.0_f64;
        let mut entity_running: HashMap<&str, f64> = HashMap::new();

        for idx in order {
            let line = &lines[idx];
            let entity_id = line.entity_id.as_deref();

            // 1) 锁定明细
            if line.is_locally_adjusted() {
                running_cost += line.scenario_cost;
                if let Some(e) = entity_id {
                    *entity_running.entry(e).or_insert(0.0) += line.scenario_cost;
                }
                dispositions[idx] = LineDisposition::Locked;
                continue;
            }

            let out = &mut updated[idx];

            // 2) 分档被排除
            if !levers.includes_band(line.priority_band) {
                out.scenario_volume = 0;
                out.scenario_sessions = 0;
                out.scenario_cost = 0.0;
                out.is_cut = true;
                dispositions[idx] = LineDisposition::Excluded;
                continue;
            }

            // 3) 其余明细
            let mut new_volume = line.baseline_volume;
            let mut new_cost = line.baseline_cost;
            let protected =
                line.is_protected || levers.is_category_protected(line.category_id.as_deref());

            if protected {
                dispositions[idx] = LineDisposition::Protected;
            } else {
                let global_limit = target_budget.map(|t| (t, running_cost));
                let entity_limit = entity_id.and_then(|e| {
                    entity_targets
                        .get(e)
                        .map(|t| (*t, entity_running.get(e).copied().unwrap_or(0.0)))
                });

                let exceeded = [global_limit, entity_limit]
                    .iter()
                    .flatten()
                    .any(|(limit, used)| used + new_cost > limit + COST_EPSILON);

                if exceeded {
                    let remaining = [global_limit, entity_limit]
                        .iter()
                        .flatten()
                        .map(|(limit, used)| (limit - used).max(0.0))
                        .fold(f64::INFINITY, f64::min);

                    let cpp = line.baseline_cost_per_participant;
                    let effective_cpp = if cpp.is_finite() && cpp > 0.0 {
                        cpp
                    } else {
                        tracing::warn!(
                            line_id = %line.line_id,
                            line_no = line.line_no,
                            cost_per_participant = cpp,
                            "人均成本无效，按 1 处理"
                        );
                        warnings.push(AllocationWarning {
                            line_id: line.line_id.clone(),
                            line_no: line.line_no,
                            message: format!("人均成本无效({})，截断时按 1 处理", cpp),
                        });
                        1.0
                    };

                    let clamped = (remaining / effective_cpp + COST_EPSILON).floor();
                    new_volume = (clamped as i64).clamp(0, line.baseline_volume.max(0));
                    new_cost = new_volume as f64 * line.baseline_cost_per_participant.max(0.0);
                    dispositions[idx] = LineDisposition::Clamped;
                }
            }

            // 4) 台账
            running_cost += new_cost;
            if let Some(e) = entity_id {
                *entity_running.entry(e).or_insert(0.0) += new_cost;
            }

            out.scenario_volume = new_volume;
            out.scenario_sessions =
                scale_sessions(line.baseline_sessions, line.baseline_volume, new_volume);
            out.scenario_cost = new_cost;
            out.is_cut = new_volume < line.baseline_volume;
        }

        let totals = ScenarioTotals::from_lines(&updated);
        let items_updated = dispositions
            .iter()
            .filter(|d| **d != LineDisposition::Locked)
            .count();

        AllocationOutcome {
            lines: updated,
            dispositions,
            totals,
            target_budget,
            items_updated,
            warnings,
        }
    }

    /// 计算遍历顺序（返回明细下标）
    ///
    /// - PERSISTED: 输入顺序
    /// - DECLARED_INTENT: 稳定排序；cutOrder 中越靠前的分档越晚遍历（越先被削减），
    ///   未列出的分档最先遍历；cutAbroadFirst 时同档内境外明细排在境内之后
    fn traversal_order(
        &self,
        lines: &[ScenarioLineItem],
        levers: &LeverConfig,
        traversal: CutTraversal,
    ) -> Vec<usize> {
        let mut order: Vec<usize> = (0..lines.len()).collect();
        if traversal == CutTraversal::DeclaredIntent {
            order.sort_by_key(|&idx| {
                let line = &lines[idx];
                let rank = levers.cut_rank(line.priority_band).unwrap_or(usize::MAX);
                let abroad_last = levers.cut_abroad_first && line.is_abroad;
                (Reverse(rank), abroad_last)
            });
        }
        order
    }
}
