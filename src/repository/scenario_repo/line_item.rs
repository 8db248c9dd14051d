use super::workspace::ScenarioRepository;
use crate::db::DATETIME_FMT;
use crate::domain::scenario::{LineAdjustment, ScenarioLineItem};
use crate::domain::types::PriorityBand;
use crate::repository::error::{
    invalid_enum_column, parse_datetime_column, RepositoryResult,
};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Result as SqliteResult, Row, Transaction};

// ==========================================
// LineItemQuery - 明细过滤条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct LineItemQuery {
    pub cut_only: bool,
    pub priority_band: Option<PriorityBand>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub(super) const LINE_COLUMNS: &str = r#"line_id, scenario_id, line_no, source_line_id,
       course_id, course_name, entity_id, category_id,
       baseline_volume, baseline_sessions, baseline_cost, baseline_cost_per_participant,
       scenario_volume, scenario_sessions, scenario_cost,
       priority_band, is_protected, is_abroad,
       is_locally_adjusted, local_adjustment_reason, adjusted_by, adjusted_at,
       is_cut"#;

impl ScenarioRepository {
    // ==========================================
    // 明细写入
    // ==========================================

    /// 批量插入情景明细（同一事务，单批失败整体回滚）
    pub fn insert_lines_batch(&self, lines: &[ScenarioLineItem]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let count = insert_lines_in_tx(&tx, lines)?;
        tx.commit()?;
        Ok(count)
    }

    // ==========================================
    // 明细查询
    // ==========================================

    /// 读取情景全部明细（按 line_no 升序）
    pub fn find_lines(&self, scenario_id: &str) -> RepositoryResult<Vec<ScenarioLineItem>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM scenario_line_item WHERE scenario_id = ? ORDER BY line_no ASC",
            LINE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params![scenario_id], map_line_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(lines)
    }

    /// 按条件读取情景明细（仅被削减 / 指定优先级，支持分页）
    pub fn find_lines_filtered(
        &self,
        scenario_id: &str,
        query: &LineItemQuery,
    ) -> RepositoryResult<Vec<ScenarioLineItem>> {
        let conn = self.get_conn()?;
        let (where_sql, mut values) = build_line_filter(scenario_id, query);
        let mut sql = format!(
            "SELECT {} FROM scenario_line_item{} ORDER BY line_no ASC",
            LINE_COLUMNS, where_sql
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(limit));
            values.push(Value::Integer(query.offset.unwrap_or(0)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let lines = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), map_line_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(lines)
    }

    /// 按条件统计情景明细（忽略分页）
    pub fn count_lines_filtered(
        &self,
        scenario_id: &str,
        query: &LineItemQuery,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let (where_sql, values) = build_line_filter(scenario_id, query);
        let sql = format!("SELECT COUNT(*) FROM scenario_line_item{}", where_sql);
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 按 line_id 查询单条明细（限定在情景内）
    pub fn find_line(
        &self,
        scenario_id: &str,
        line_id: &str,
    ) -> RepositoryResult<Option<ScenarioLineItem>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM scenario_line_item WHERE scenario_id = ? AND line_id = ?",
            LINE_COLUMNS
        );
        let line = conn
            .query_row(&sql, params![scenario_id, line_id], map_line_row)
            .optional()?;
        Ok(line)
    }
}

fn build_line_filter(scenario_id: &str, query: &LineItemQuery) -> (String, Vec<Value>) {
    let mut where_sql = String::from(" WHERE scenario_id = ?");
    let mut values = vec![Value::Text(scenario_id.to_string())];

    if query.cut_only {
        where_sql.push_str(" AND is_cut = 1");
    }
    if let Some(band) = query.priority_band {
        where_sql.push_str(" AND priority_band = ?");
        values.push(Value::Text(band.to_db_str().to_string()));
    }
    (where_sql, values)
}

fn insert_lines_in_tx(
    tx: &Transaction<'_>,
    lines: &[ScenarioLineItem],
) -> RepositoryResult<usize> {
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO scenario_line_item ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        LINE_COLUMNS
    ))?;

    let mut count = 0;
    for line in lines {
        let (locked, reason, adjusted_by, adjusted_at) = adjustment_columns(&line.adjustment);
        stmt.execute(params![
            &line.line_id,
            &line.scenario_id,
            &line.line_no,
            &line.source_line_id,
            &line.course_id,
            &line.course_name,
            &line.entity_id,
            &line.category_id,
            &line.baseline_volume,
            &line.baseline_sessions,
            &line.baseline_cost,
            &line.baseline_cost_per_participant,
            &line.scenario_volume,
            &line.scenario_sessions,
            &line.scenario_cost,
            line.priority_band.to_db_str(),
            line.is_protected as i32,
            line.is_abroad as i32,
            locked,
            reason,
            adjusted_by,
            adjusted_at,
            line.is_cut as i32,
        ])?;
        count += 1;
    }
    Ok(count)
}

/// 展开调整状态为数据库列 (is_locally_adjusted, reason, adjusted_by, adjusted_at)
pub(super) fn adjustment_columns(
    adjustment: &LineAdjustment,
) -> (i32, Option<String>, Option<String>, Option<String>) {
    match adjustment {
        LineAdjustment::Engine => (0, None, None, None),
        LineAdjustment::Locked {
            reason,
            adjusted_by,
            adjusted_at,
        } => (
            1,
            reason.clone(),
            Some(adjusted_by.clone()),
            Some(adjusted_at.format(DATETIME_FMT).to_string()),
        ),
    }
}

/// 映射数据库行到ScenarioLineItem对象
pub(super) fn map_line_row(row: &Row) -> SqliteResult<ScenarioLineItem> {
    let band_raw: String = row.get(15)?;
    let priority_band =
        PriorityBand::parse(&band_raw).ok_or_else(|| invalid_enum_column(15, &band_raw))?;

    let locked = row.get::<_, i32>(18)? != 0;
    let adjustment = if locked {
        let adjusted_at_raw: Option<String> = row.get(21)?;
        let adjusted_at = match adjusted_at_raw {
            Some(raw) => parse_datetime_column(21, &raw)?,
            None => return Err(invalid_enum_column(21, "NULL")),
        };
        LineAdjustment::Locked {
            reason: row.get(19)?,
            adjusted_by: row.get::<_, Option<String>>(20)?.unwrap_or_default(),
            adjusted_at,
        }
    } else {
        LineAdjustment::Engine
    };

    Ok(ScenarioLineItem {
        line_id: row.get(0)?,
        scenario_id: row.get(1)?,
        line_no: row.get(2)?,
        source_line_id: row.get(3)?,
        course_id: row.get(4)?,
        course_name: row.get(5)?,
        entity_id: row.get(6)?,
        category_id: row.get(7)?,
        baseline_volume: row.get(8)?,
        baseline_sessions: row.get(9)?,
        baseline_cost: row.get(10)?,
        baseline_cost_per_participant: row.get(11)?,
        scenario_volume: row.get(12)?,
        scenario_sessions: row.get(13)?,
        scenario_cost: row.get(14)?,
        priority_band,
        is_protected: row.get::<_, i32>(16)? != 0,
        is_abroad: row.get::<_, i32>(17)? != 0,
        adjustment,
        is_cut: row.get::<_, i32>(22)? != 0,
    })
}
