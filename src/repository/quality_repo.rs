// ==========================================
// 市级治理效能评分系统 - 数据质量标记仓储
// ==========================================
// 职责: data_quality_flag 表的追加写入与查询 (只增不改)
// ==========================================

use crate::domain::quality::{DataQualityFlag, FlagSeverity, FlagType};
use crate::repository::error::{format_datetime, parse_datetime, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

type FlagRow = (
    i64,
    Option<String>,
    i64,
    Option<i64>,
    Option<i64>,
    Option<String>,
    String,
    String,
    String,
    String,
);

fn into_flag(row: FlagRow) -> RepositoryResult<DataQualityFlag> {
    let (flag_id, run_id, version_id, entity_id, period_id, code, flag_type, severity, message, created_at) =
        row;
    let flag_type = FlagType::from_str(&flag_type).ok_or_else(|| RepositoryError::FieldValueError {
        field: "flag_type".to_string(),
        message: format!("未知标记类型: {}", flag_type),
    })?;
    Ok(DataQualityFlag {
        flag_id: Some(flag_id),
        run_id,
        methodology_version_id: version_id,
        entity_id,
        period_id,
        criterion_code: code,
        flag_type,
        severity: FlagSeverity::from_str(&severity),
        message,
        created_at: parse_datetime("created_at", &created_at)?,
    })
}

// ==========================================
// DataQualityRepository - 数据质量标记仓储
// ==========================================
pub struct DataQualityRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DataQualityRepository {
    pub fn new(db_path: String) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(&db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量追加标记 (单事务)
    pub fn insert_batch(&self, flags: &[DataQualityFlag]) -> RepositoryResult<usize> {
        if flags.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO data_quality_flag (
                    run_id, methodology_version_id, entity_id, period_id, criterion_code,
                    flag_type, severity, message, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for flag in flags {
                stmt.execute(params![
                    flag.run_id,
                    flag.methodology_version_id,
                    flag.entity_id,
                    flag.period_id,
                    flag.criterion_code,
                    flag.flag_type.as_str(),
                    flag.severity.as_str(),
                    flag.message,
                    format_datetime(&flag.created_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(flags.len())
    }

    /// 查询某版本的标记 (最新在前)
    pub fn list_by_version(
        &self,
        methodology_version_id: i64,
        limit: usize,
    ) -> RepositoryResult<Vec<DataQualityFlag>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT flag_id, run_id, methodology_version_id, entity_id, period_id, criterion_code,
                   flag_type, severity, message, created_at
            FROM data_quality_flag
            WHERE methodology_version_id = ?1
            ORDER BY flag_id DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![methodology_version_id, limit as i64], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                ))
            })?
            .collect::<SqliteResult<Vec<FlagRow>>>()?;
        rows.into_iter().map(into_flag).collect()
    }

    /// 按类型统计某次运行 (或全部运行) 的标记数
    pub fn count_by_type(
        &self,
        methodology_version_id: i64,
        run_id: Option<&str>,
    ) -> RepositoryResult<Vec<(FlagType, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT flag_type, COUNT(*)
            FROM data_quality_flag
            WHERE methodology_version_id = ?1 AND (?2 IS NULL OR run_id = ?2)
            GROUP BY flag_type
            ORDER BY flag_type
            "#,
        )?;
        let rows = stmt
            .query_map(params![methodology_version_id, run_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(t, n)| FlagType::from_str(&t).map(|t| (t, n)))
            .collect())
    }

    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM data_quality_flag", [], |row| row.get(0))?;
        Ok(count)
    }
}
