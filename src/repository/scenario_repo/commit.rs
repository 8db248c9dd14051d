use super::line_item::adjustment_columns;
use super::workspace::{lock_failure, now_text, ScenarioRepository};
use crate::db::DATETIME_FMT;
use crate::domain::levers::LeverConfig;
use crate::domain::plan::{TrainingPlan, TrainingPlanLine};
use crate::domain::scenario::{ScenarioLineItem, ScenarioTotals};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::plan_repo::insert_plan_with_lines;
use chrono::NaiveDateTime;
use rusqlite::{params, Transaction};

// ==========================================
// 情景提交操作 (事务 + 乐观锁)
// ==========================================
// 流程: revision 校验并递增 -> 明细写入 -> 聚合刷新 -> commit
// 任一步失败: 事务 drop 自动回滚，工作区保持提交前状态

impl ScenarioRepository {
    /// 提交一次重算结果
    ///
    /// # 参数
    /// - `expected_revision`: 读取工作区时的 revision
    /// - `lines`: 引擎输出的明细（锁定明细即使传入也不会被覆盖）
    /// - `levers`: 本次使用的杠杆配置（记录到工作区）
    ///
    /// # 返回
    /// - `Ok(new_revision)`
    /// - `Err(OptimisticLockFailure)`: 期间有其他写入
    pub fn commit_allocation(
        &self,
        scenario_id: &str,
        expected_revision: i32,
        lines: &[ScenarioLineItem],
        levers: &LeverConfig,
        recalculated_at: NaiveDateTime,
    ) -> RepositoryResult<i32> {
        let levers_json = serde_json::to_string(levers)?;
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            r#"UPDATE scenario_workspace
               SET levers_json = ?1,
                   last_recalculation_at = ?2,
                   updated_at = ?3,
                   revision = revision + 1
               WHERE scenario_id = ?4 AND revision = ?5"#,
            params![
                levers_json,
                recalculated_at.format(DATETIME_FMT).to_string(),
                now_text(),
                scenario_id,
                expected_revision,
            ],
        )?;
        if rows == 0 {
            return Err(lock_failure(&tx, scenario_id, expected_revision)?);
        }

        {
            let mut stmt = tx.prepare(
                r#"UPDATE scenario_line_item
                   SET scenario_volume = ?1,
                       scenario_sessions = ?2,
                       scenario_cost = ?3,
                       is_cut = ?4
                   WHERE line_id = ?5 AND scenario_id = ?6 AND is_locally_adjusted = 0"#,
            )?;
            for line in lines.iter().filter(|l| !l.is_locally_adjusted()) {
                stmt.execute(params![
                    line.scenario_volume,
                    line.scenario_sessions,
                    line.scenario_cost,
                    line.is_cut as i32,
                    &line.line_id,
                    scenario_id,
                ])?;
            }
        }

        refresh_totals_in_tx(&tx, scenario_id)?;
        tx.commit()?;
        Ok(expected_revision + 1)
    }

    /// 提交一次局部调整（明细锁定 + 聚合刷新）
    ///
    /// # 返回
    /// - `Ok((new_revision, totals))`: totals 在同一事务内读取，与本次写入一致
    pub fn commit_adjustment(
        &self,
        scenario_id: &str,
        expected_revision: i32,
        line: &ScenarioLineItem,
    ) -> RepositoryResult<(i32, ScenarioTotals)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            r#"UPDATE scenario_workspace
               SET updated_at = ?1, revision = revision + 1
               WHERE scenario_id = ?2 AND revision = ?3"#,
            params![now_text(), scenario_id, expected_revision],
        )?;
        if rows == 0 {
            return Err(lock_failure(&tx, scenario_id, expected_revision)?);
        }

        let (locked, reason, adjusted_by, adjusted_at) = adjustment_columns(&line.adjustment);
        let rows = tx.execute(
            r#"UPDATE scenario_line_item
               SET scenario_volume = ?1,
                   scenario_sessions = ?2,
                   scenario_cost = ?3,
                   is_cut = ?4,
                   is_locally_adjusted = ?5,
                   local_adjustment_reason = ?6,
                   adjusted_by = ?7,
                   adjusted_at = ?8
               WHERE line_id = ?9 AND scenario_id = ?10"#,
            params![
                line.scenario_volume,
                line.scenario_sessions,
                line.scenario_cost,
                line.is_cut as i32,
                locked,
                reason,
                adjusted_by,
                adjusted_at,
                &line.line_id,
                scenario_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "ScenarioLineItem".to_string(),
                id: line.line_id.clone(),
            });
        }

        refresh_totals_in_tx(&tx, scenario_id)?;
        let totals = read_totals_in_tx(&tx, scenario_id)?;
        tx.commit()?;
        Ok((expected_revision + 1, totals))
    }

    /// 提交采纳: 写入新计划 + 工作区置为 ADOPTED（同一事务）
    ///
    /// 工作区必须仍为 APPROVED 且未采纳过，否则整体回滚。
    pub fn commit_promotion(
        &self,
        scenario_id: &str,
        expected_revision: i32,
        plan: &TrainingPlan,
        plan_lines: &[TrainingPlanLine],
    ) -> RepositoryResult<i32> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        insert_plan_with_lines(&tx, plan, plan_lines)?;

        let rows = tx.execute(
            r#"UPDATE scenario_workspace
               SET status = 'ADOPTED',
                   promoted_to_plan_id = ?1,
                   updated_at = ?2,
                   revision = revision + 1
               WHERE scenario_id = ?3
                 AND revision = ?4
                 AND status = 'APPROVED'
                 AND promoted_to_plan_id IS NULL"#,
            params![&plan.plan_id, now_text(), scenario_id, expected_revision],
        )?;
        if rows == 0 {
            let err = lock_failure(&tx, scenario_id, expected_revision)?;
            return Err(match err {
                RepositoryError::OptimisticLockFailure { expected, actual, .. }
                    if expected == actual =>
                {
                    RepositoryError::BusinessRuleViolation(format!(
                        "情景 {} 不是可采纳状态或已被采纳",
                        scenario_id
                    ))
                }
                other => other,
            });
        }

        tx.commit()?;
        Ok(expected_revision + 1)
    }
}

/// 按明细重算工作区聚合值（聚合 = 明细求和，包括锁定与被排除的明细）
fn refresh_totals_in_tx(tx: &Transaction<'_>, scenario_id: &str) -> RepositoryResult<()> {
    tx.execute(
        r#"UPDATE scenario_workspace
           SET baseline_total_cost = COALESCE((SELECT SUM(baseline_cost) FROM scenario_line_item WHERE scenario_id = ?1), 0),
               scenario_total_cost = COALESCE((SELECT SUM(scenario_cost) FROM scenario_line_item WHERE scenario_id = ?1), 0),
               baseline_total_participants = COALESCE((SELECT SUM(baseline_volume) FROM scenario_line_item WHERE scenario_id = ?1), 0),
               scenario_total_participants = COALESCE((SELECT SUM(scenario_volume) FROM scenario_line_item WHERE scenario_id = ?1), 0)
           WHERE scenario_id = ?1"#,
        params![scenario_id],
    )?;
    Ok(())
}

fn read_totals_in_tx(tx: &Transaction<'_>, scenario_id: &str) -> RepositoryResult<ScenarioTotals> {
    let totals = tx.query_row(
        r#"SELECT baseline_total_cost, scenario_total_cost,
                  baseline_total_participants, scenario_total_participants
           FROM scenario_workspace WHERE scenario_id = ?1"#,
        params![scenario_id],
        |row| {
            Ok(ScenarioTotals {
                baseline_total_cost: row.get(0)?,
                scenario_total_cost: row.get(1)?,
                baseline_total_participants: row.get(2)?,
                scenario_total_participants: row.get(3)?,
            })
        },
    )?;
    Ok(totals)
}
