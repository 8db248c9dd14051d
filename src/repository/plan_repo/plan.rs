use crate::db::DATETIME_FMT;
use crate::domain::plan::{TrainingPlan, TrainingPlanLine};
use crate::repository::error::{parse_datetime_column, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};

// ==========================================
// TrainingPlanRepository - 培训计划仓储
// ==========================================
pub struct TrainingPlanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TrainingPlanRepository {
    /// 创建新的TrainingPlanRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建计划（不含明细）
    ///
    /// # 返回
    /// - `Ok(plan_id)`: 成功，返回plan_id
    /// - `Err`: 失败，返回错误信息
    pub fn create(&self, plan: &TrainingPlan) -> RepositoryResult<String> {
        self.create_with_lines(plan, &[])
    }

    /// 创建计划及其明细（同一事务）
    pub fn create_with_lines(
        &self,
        plan: &TrainingPlan,
        lines: &[TrainingPlanLine],
    ) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        insert_plan_with_lines(&tx, plan, lines)?;
        tx.commit()?;
        Ok(plan.plan_id.clone())
    }

    /// 按plan_id查询计划
    ///
    /// # 返回
    /// - `Ok(Some(TrainingPlan))`: 找到计划
    /// - `Ok(None)`: 未找到计划
    /// - `Err`: 数据库错误
    pub fn find_by_id(&self, plan_id: &str) -> RepositoryResult<Option<TrainingPlan>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT plan_id, plan_name, description, version, total_budget,
                      total_participants, source_scenario_id, created_by,
                      created_at, updated_at
               FROM training_plan
               WHERE plan_id = ?"#,
            params![plan_id],
            map_plan_row,
        ) {
            Ok(plan) => Ok(Some(plan)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询所有计划（按created_at降序）
    pub fn list_all(&self) -> RepositoryResult<Vec<TrainingPlan>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT plan_id, plan_name, description, version, total_budget,
                      total_participants, source_scenario_id, created_by,
                      created_at, updated_at
               FROM training_plan
               ORDER BY created_at DESC, plan_id"#,
        )?;

        let plans = stmt
            .query_map([], map_plan_row)?
            .collect::<Result<Vec<TrainingPlan>, _>>()?;

        Ok(plans)
    }
}

/// 在已有事务内写入计划及明细
///
/// 供情景采纳复用，保证“新计划 + 情景状态”同事务提交。
pub(crate) fn insert_plan_with_lines(
    tx: &Transaction<'_>,
    plan: &TrainingPlan,
    lines: &[TrainingPlanLine],
) -> RepositoryResult<()> {
    tx.execute(
        r#"INSERT INTO training_plan (
            plan_id, plan_name, description, version, total_budget,
            total_participants, source_scenario_id, created_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            &plan.plan_id,
            &plan.plan_name,
            &plan.description,
            &plan.version,
            &plan.total_budget,
            &plan.total_participants,
            &plan.source_scenario_id,
            &plan.created_by,
            &plan.created_at.format(DATETIME_FMT).to_string(),
            &plan.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;

    let mut stmt = tx.prepare(
        r#"INSERT INTO training_plan_line (
                line_id, plan_id, line_no, course_id, course_name,
                entity_id, category_id, volume, sessions, cost,
                priority_band, is_protected, is_abroad
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )?;

    for line in lines {
        stmt.execute(params![
            &line.line_id,
            &line.plan_id,
            &line.line_no,
            &line.course_id,
            &line.course_name,
            &line.entity_id,
            &line.category_id,
            &line.volume,
            &line.sessions,
            &line.cost,
            line.priority_band.to_db_str(),
            if line.is_protected { 1 } else { 0 },
            if line.is_abroad { 1 } else { 0 },
        ])?;
    }

    Ok(())
}

/// 映射数据库行到TrainingPlan对象
fn map_plan_row(row: &rusqlite::Row) -> rusqlite::Result<TrainingPlan> {
    Ok(TrainingPlan {
        plan_id: row.get(0)?,
        plan_name: row.get(1)?,
        description: row.get(2)?,
        version: row.get(3)?,
        total_budget: row.get(4)?,
        total_participants: row.get(5)?,
        source_scenario_id: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime_column(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_datetime_column(9, &row.get::<_, String>(9)?)?,
    })
}
