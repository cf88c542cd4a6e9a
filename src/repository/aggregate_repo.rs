// ==========================================
// 市级治理效能评分系统 - 汇总评分数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 只有聚合引擎写入 fact_summary; 从不因重算失败删除旧行
// ==========================================
// 幂等: 评分未变化时保留原 updated_at, 重跑后行内容逐字节一致
// ==========================================

use crate::domain::aggregate::{Aggregate, UnitKey};
use crate::domain::types::Zone;
use crate::repository::error::{format_datetime, parse_datetime, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 评分表行 (汇总 + 主体维度)
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub entity_id: i64,
    pub entity_name: String,
    pub leader_name: Option<String>,
    pub period_id: i64,
    pub methodology_version_id: i64,
    pub score_public: f64,
    pub score_closed: f64,
    pub score_penalties: f64,
    pub score_total: f64,
    pub zone: Zone,
}

// ==========================================
// AggregateRepository - 汇总评分仓储
// ==========================================
pub struct AggregateRepository {
    conn: Arc<Mutex<Connection>>,
}

fn zone_at(row: &Row, idx: usize) -> SqliteResult<Zone> {
    let raw: String = row.get(idx)?;
    Zone::from_str(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("未知风险区间: {}", raw).into(),
        )
    })
}

fn datetime_at(row: &Row, idx: usize) -> SqliteResult<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_datetime("updated_at", &raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

fn map_aggregate(row: &Row) -> SqliteResult<Aggregate> {
    Ok(Aggregate {
        entity_id: row.get(0)?,
        period_id: row.get(1)?,
        methodology_version_id: row.get(2)?,
        score_public: row.get(3)?,
        score_closed: row.get(4)?,
        score_penalties: row.get(5)?,
        score_total: row.get(6)?,
        zone: zone_at(row, 7)?,
        updated_at: Some(datetime_at(row, 8)?),
    })
}

const SELECT_AGGREGATE: &str = r#"
    SELECT entity_id, period_id, methodology_version_id,
           score_public, score_closed, score_penalties, score_total, zone, updated_at
    FROM fact_summary
"#;

/// 单行 upsert (供单条与批量写入共用)
fn upsert_on(conn: &Connection, aggregate: &Aggregate, now: &str) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO fact_summary (
            entity_id, period_id, methodology_version_id,
            score_public, score_closed, score_penalties, score_total, zone, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(entity_id, period_id, methodology_version_id) DO UPDATE SET
            score_public = excluded.score_public,
            score_closed = excluded.score_closed,
            score_penalties = excluded.score_penalties,
            score_total = excluded.score_total,
            zone = excluded.zone,
            updated_at = CASE
                WHEN fact_summary.score_public IS NOT excluded.score_public
                  OR fact_summary.score_closed IS NOT excluded.score_closed
                  OR fact_summary.score_penalties IS NOT excluded.score_penalties
                  OR fact_summary.score_total IS NOT excluded.score_total
                  OR fact_summary.zone IS NOT excluded.zone
                THEN excluded.updated_at
                ELSE fact_summary.updated_at
            END
        "#,
        params![
            aggregate.entity_id,
            aggregate.period_id,
            aggregate.methodology_version_id,
            aggregate.score_public,
            aggregate.score_closed,
            aggregate.score_penalties,
            aggregate.score_total,
            aggregate.zone.as_str(),
            now,
        ],
    )?;
    Ok(())
}

fn find_on(conn: &Connection, key: UnitKey) -> RepositoryResult<Option<Aggregate>> {
    let sql = format!(
        "{} WHERE entity_id = ?1 AND period_id = ?2 AND methodology_version_id = ?3",
        SELECT_AGGREGATE
    );
    let aggregate = conn
        .query_row(
            &sql,
            params![key.entity_id, key.period_id, key.methodology_version_id],
            map_aggregate,
        )
        .optional()?;
    Ok(aggregate)
}

impl AggregateRepository {
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

    /// 插入或更新单个汇总行
    ///
    /// # 返回
    /// - Ok(Aggregate): 写入后的行 (含 updated_at)
    pub fn upsert(&self, aggregate: &Aggregate) -> RepositoryResult<Aggregate> {
        let conn = self.get_conn()?;
        let now = format_datetime(&chrono::Utc::now().naive_utc());
        upsert_on(&conn, aggregate, &now)?;
        find_on(&conn, aggregate.key())?.ok_or_else(|| RepositoryError::NotFound {
            entity: "fact_summary".to_string(),
            id: aggregate.key().to_string(),
        })
    }

    /// 单事务批量写入 (读者不会看到半重建的评分表)
    ///
    /// # 返回
    /// - Ok(usize): 写入行数
    pub fn upsert_batch(&self, aggregates: &[Aggregate]) -> RepositoryResult<usize> {
        if aggregates.is_empty() {
            return Ok(0);
        }
        let conn = self.get_conn()?;
        let now = format_datetime(&chrono::Utc::now().naive_utc());
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        for aggregate in aggregates {
            upsert_on(&tx, aggregate, &now)?;
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(aggregates.len())
    }

    /// 按单元键查询
    pub fn find(&self, key: UnitKey) -> RepositoryResult<Option<Aggregate>> {
        let conn = self.get_conn()?;
        find_on(&conn, key)
    }

    /// 按版本/周期查询汇总行 (按 entity_id 排序)
    pub fn list(
        &self,
        methodology_version_id: i64,
        period_id: Option<i64>,
    ) -> RepositoryResult<Vec<Aggregate>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE methodology_version_id = ?1 AND (?2 IS NULL OR period_id = ?2)
             ORDER BY period_id, entity_id",
            SELECT_AGGREGATE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![methodology_version_id, period_id], map_aggregate)?
            .collect::<SqliteResult<Vec<Aggregate>>>()?;
        Ok(rows)
    }

    /// 评分表数据 (汇总 JOIN 主体维度)
    pub fn list_rating_records(
        &self,
        methodology_version_id: i64,
        period_id: i64,
    ) -> RepositoryResult<Vec<RatingRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT s.entity_id, e.entity_name, e.leader_name, s.period_id, s.methodology_version_id,
                   s.score_public, s.score_closed, s.score_penalties, s.score_total, s.zone
            FROM fact_summary s
            JOIN dim_entity e ON e.entity_id = s.entity_id
            WHERE s.methodology_version_id = ?1 AND s.period_id = ?2
            ORDER BY s.entity_id
            "#,
        )?;
        let rows = stmt
            .query_map(params![methodology_version_id, period_id], |row| {
                Ok(RatingRecord {
                    entity_id: row.get(0)?,
                    entity_name: row.get(1)?,
                    leader_name: row.get(2)?,
                    period_id: row.get(3)?,
                    methodology_version_id: row.get(4)?,
                    score_public: row.get(5)?,
                    score_closed: row.get(6)?,
                    score_penalties: row.get(7)?,
                    score_total: row.get(8)?,
                    zone: zone_at(row, 9)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 汇总行总数
    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM fact_summary", [], |row| row.get(0))?;
        Ok(count)
    }
}
