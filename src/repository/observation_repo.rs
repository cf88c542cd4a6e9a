// ==========================================
// 市级治理效能评分系统 - 原始观测数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 引擎只回填 score, 从不删除观测
// ==========================================

use crate::domain::observation::Observation;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 每周期观测计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodCount {
    pub period_id: i64,
    pub count: i64,
}

// ==========================================
// ObservationRepository - 原始观测仓储
// ==========================================
pub struct ObservationRepository {
    conn: Arc<Mutex<Connection>>,
}

fn map_row(row: &Row) -> SqliteResult<Observation> {
    Ok(Observation {
        entity_id: row.get(0)?,
        period_id: row.get(1)?,
        criterion_code: row.get(2)?,
        methodology_version_id: row.get(3)?,
        raw_value: row.get(4)?,
        score: row.get(5)?,
    })
}

impl ObservationRepository {
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

    /// 查询单个聚合单元的观测
    ///
    /// # 参数
    /// - entity_id / period_id / methodology_version_id: 聚合单元键
    ///
    /// # 返回
    /// - 顺序不作保证 (聚合与顺序无关)
    pub fn fetch_observations(
        &self,
        entity_id: i64,
        period_id: i64,
        methodology_version_id: i64,
    ) -> RepositoryResult<Vec<Observation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT entity_id, period_id, criterion_code, methodology_version_id, raw_value, score
            FROM fact_observation
            WHERE entity_id = ?1 AND period_id = ?2 AND methodology_version_id = ?3
            "#,
        )?;
        let observations = stmt
            .query_map(params![entity_id, period_id, methodology_version_id], map_row)?
            .collect::<SqliteResult<Vec<Observation>>>()?;
        Ok(observations)
    }

    /// 查询某版本在范围内的全部观测 (一致性修复使用)
    ///
    /// # 参数
    /// - period_id: None 表示全部周期
    /// - entity_ids: None 表示全部主体
    pub fn list_in_scope(
        &self,
        methodology_version_id: i64,
        period_id: Option<i64>,
        entity_ids: Option<&[i64]>,
    ) -> RepositoryResult<Vec<Observation>> {
        let conn = self.get_conn()?;

        let mut sql = String::from(
            "SELECT entity_id, period_id, criterion_code, methodology_version_id, raw_value, score
             FROM fact_observation WHERE methodology_version_id = ?",
        );
        let mut values: Vec<i64> = vec![methodology_version_id];
        if let Some(period_id) = period_id {
            sql.push_str(" AND period_id = ?");
            values.push(period_id);
        }
        if let Some(ids) = entity_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND entity_id IN ({})", placeholders));
            values.extend_from_slice(ids);
        }
        sql.push_str(" ORDER BY entity_id, period_id, criterion_code");

        let mut stmt = conn.prepare(&sql)?;
        let observations = stmt
            .query_map(params_from_iter(values.iter()), map_row)?
            .collect::<SqliteResult<Vec<Observation>>>()?;
        Ok(observations)
    }

    /// 插入或更新观测 (导入方入口, 按复合键覆盖)
    pub fn upsert(&self, observation: &Observation) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO fact_observation (
                entity_id, period_id, criterion_code, methodology_version_id, raw_value, score
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(entity_id, period_id, criterion_code, methodology_version_id) DO UPDATE SET
                raw_value = excluded.raw_value,
                score = excluded.score,
                updated_at = datetime('now')
            "#,
            params![
                observation.entity_id,
                observation.period_id,
                observation.criterion_code,
                observation.methodology_version_id,
                observation.raw_value,
                observation.score,
            ],
        )?;
        Ok(())
    }

    /// 批量回填 score (仅当原值为空, 单事务)
    ///
    /// # 返回
    /// - Ok(usize): 实际回填行数
    pub fn backfill_scores(&self, resolved: &[(Observation, f64)]) -> RepositoryResult<usize> {
        if resolved.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                UPDATE fact_observation
                SET score = ?5, updated_at = datetime('now')
                WHERE entity_id = ?1 AND period_id = ?2 AND criterion_code = ?3
                  AND methodology_version_id = ?4 AND score IS NULL
                "#,
            )?;
            for (obs, score) in resolved {
                count += stmt.execute(params![
                    obs.entity_id,
                    obs.period_id,
                    obs.criterion_code,
                    obs.methodology_version_id,
                    score,
                ])?;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// 观测总数
    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM fact_observation", [], |row| row.get(0))?;
        Ok(count)
    }

    /// 按周期统计观测数
    pub fn count_by_period(&self) -> RepositoryResult<Vec<PeriodCount>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT period_id, COUNT(*) FROM fact_observation GROUP BY period_id ORDER BY period_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PeriodCount {
                    period_id: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}
