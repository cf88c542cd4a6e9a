// ==========================================
// 市级治理效能评分系统 - 聚合运行日志仓储
// ==========================================
// 职责: aggregation_run 表 (一次批量聚合一行)
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationRunEntity {
    pub run_id: String,
    pub trigger_type: String,
    pub trigger_source: Option<String>,
    pub scope_json: String,
    pub status: String,
    pub succeeded: i64,
    pub failed: i64,
    pub repaired_json: Option<String>,
    pub failures_json: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
}

fn map_row(row: &Row) -> SqliteResult<AggregationRunEntity> {
    Ok(AggregationRunEntity {
        run_id: row.get(0)?,
        trigger_type: row.get(1)?,
        trigger_source: row.get(2)?,
        scope_json: row.get(3)?,
        status: row.get(4)?,
        succeeded: row.get(5)?,
        failed: row.get(6)?,
        repaired_json: row.get(7)?,
        failures_json: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        duration_ms: row.get(11)?,
    })
}

pub struct AggregationRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AggregationRunRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 登记运行开始 (status = RUNNING)
    pub fn insert_started(
        &self,
        run_id: &str,
        trigger_type: &str,
        trigger_source: Option<&str>,
        scope_json: &str,
        started_at: &str,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO aggregation_run (run_id, trigger_type, trigger_source, scope_json, status, started_at)
            VALUES (?1, ?2, ?3, ?4, 'RUNNING', ?5)
            "#,
            params![run_id, trigger_type, trigger_source, scope_json, started_at],
        )?;
        Ok(())
    }

    /// 登记运行结束
    #[allow(clippy::too_many_arguments)]
    pub fn finish(
        &self,
        run_id: &str,
        status: &str,
        succeeded: i64,
        failed: i64,
        repaired_json: Option<&str>,
        failures_json: Option<&str>,
        completed_at: &str,
        duration_ms: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE aggregation_run
            SET status = ?2, succeeded = ?3, failed = ?4, repaired_json = ?5,
                failures_json = ?6, completed_at = ?7, duration_ms = ?8
            WHERE run_id = ?1
            "#,
            params![
                run_id,
                status,
                succeeded,
                failed,
                repaired_json,
                failures_json,
                completed_at,
                duration_ms
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "aggregation_run".to_string(),
                id: run_id.to_string(),
            });
        }
        Ok(())
    }

    /// 最近的运行记录 (最新在前)
    pub fn list_recent(&self, limit: usize) -> RepositoryResult<Vec<AggregationRunEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, trigger_type, trigger_source, scope_json, status, succeeded, failed,
                   repaired_json, failures_json, started_at, completed_at, duration_ms
            FROM aggregation_run
            ORDER BY started_at DESC, run_id
            LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit as i64], map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
