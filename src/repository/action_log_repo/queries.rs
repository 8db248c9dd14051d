use super::core::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::error::{parse_datetime_column, RepositoryResult};
use rusqlite::types::Value;
use rusqlite::{Result as SqliteResult, Row};

const TRAIL_COLUMNS: &str =
    "action_id, scenario_id, action_type, action_ts, actor, payload_json, detail";

// ==========================================
// AuditTrailQuery - 审计轨迹过滤条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct AuditTrailQuery {
    pub scenario_id: String,
    pub action_type: Option<ActionType>,
    pub actor: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditTrailQuery {
    /// 某情景的完整轨迹（不过滤、不分页）
    pub fn for_scenario(scenario_id: &str) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            ..Default::default()
        }
    }

    fn filter(&self) -> (String, Vec<Value>) {
        let mut where_sql = String::from(" WHERE scenario_id = ?");
        let mut values = vec![Value::Text(self.scenario_id.clone())];

        if let Some(kind) = self.action_type {
            where_sql.push_str(" AND action_type = ?");
            values.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(actor) = self.actor.as_deref() {
            where_sql.push_str(" AND actor = ?");
            values.push(Value::Text(actor.to_string()));
        }
        (where_sql, values)
    }
}

impl ActionLogRepository {
    /// 按条件查询审计轨迹（时间正序）
    pub fn find_trail(&self, query: &AuditTrailQuery) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;
        let (where_sql, mut values) = query.filter();

        // action_ts 精度为秒，同秒内按 rowid 保持写入顺序
        let mut sql = format!(
            "SELECT {} FROM action_log{} ORDER BY action_ts ASC, rowid ASC",
            TRAIL_COLUMNS, where_sql
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::Integer(limit));
            values.push(Value::Integer(query.offset.unwrap_or(0)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 按条件统计审计条数（忽略分页）
    pub fn count_trail(&self, query: &AuditTrailQuery) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let (where_sql, values) = query.filter();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM action_log{}", where_sql),
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_row(row: &Row) -> SqliteResult<ActionLog> {
    let action_ts_str: String = row.get(3)?;
    let payload_json_str: Option<String> = row.get(5)?;

    // 损坏的历史负载按缺失处理
    let payload_json = payload_json_str.and_then(|s| serde_json::from_str(&s).ok());

    Ok(ActionLog {
        action_id: row.get(0)?,
        scenario_id: row.get(1)?,
        action_type: row.get(2)?,
        action_ts: parse_datetime_column(3, &action_ts_str)?,
        actor: row.get(4)?,
        payload_json,
        detail: row.get(6)?,
    })
}
