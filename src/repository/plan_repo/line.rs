use super::plan::TrainingPlanRepository;
use crate::domain::plan::TrainingPlanLine;
use crate::domain::types::PriorityBand;
use crate::repository::error::{invalid_enum_column, RepositoryResult};
use rusqlite::params;

// ==========================================
// 计划明细查询
// ==========================================
// 快照复制按 line_no 分页读取，保证情景明细顺序与基准一致

const LINE_COLUMNS: &str = r#"line_id, plan_id, line_no, course_id, course_name,
       entity_id, category_id, volume, sessions, cost,
       priority_band, is_protected, is_abroad"#;

impl TrainingPlanRepository {
    /// 统计计划明细行数
    pub fn count_lines(&self, plan_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM training_plan_line WHERE plan_id = ?",
            params![plan_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 分页读取计划明细（按 line_no 升序）
    pub fn find_lines_paged(
        &self,
        plan_id: &str,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<TrainingPlanLine>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM training_plan_line WHERE plan_id = ? ORDER BY line_no ASC LIMIT ? OFFSET ?",
            LINE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params![plan_id, limit, offset], map_line_row)?
            .collect::<Result<Vec<TrainingPlanLine>, _>>()?;
        Ok(lines)
    }

    /// 读取计划全部明细（按 line_no 升序）
    pub fn find_lines_by_plan(&self, plan_id: &str) -> RepositoryResult<Vec<TrainingPlanLine>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM training_plan_line WHERE plan_id = ? ORDER BY line_no ASC",
            LINE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params![plan_id], map_line_row)?
            .collect::<Result<Vec<TrainingPlanLine>, _>>()?;
        Ok(lines)
    }
}

fn map_line_row(row: &rusqlite::Row) -> rusqlite::Result<TrainingPlanLine> {
    let band_raw: String = row.get(10)?;
    let priority_band =
        PriorityBand::parse(&band_raw).ok_or_else(|| invalid_enum_column(10, &band_raw))?;

    Ok(TrainingPlanLine {
        line_id: row.get(0)?,
        plan_id: row.get(1)?,
        line_no: row.get(2)?,
        course_id: row.get(3)?,
        course_name: row.get(4)?,
        entity_id: row.get(5)?,
        category_id: row.get(6)?,
        volume: row.get(7)?,
        sessions: row.get(8)?,
        cost: row.get(9)?,
        priority_band,
        is_protected: row.get::<_, i32>(11)? != 0,
        is_abroad: row.get::<_, i32>(12)? != 0,
    })
}
