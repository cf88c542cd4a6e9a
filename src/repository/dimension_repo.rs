// ==========================================
// 市级治理效能评分系统 - 维度数据仓储
// ==========================================
// 职责: dim_entity / dim_period 的读写
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::dimension::{Entity, Period};
use crate::domain::types::PeriodType;
use crate::repository::error::{parse_date, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// EntityRepository - 被评主体仓储
// ==========================================
pub struct EntityRepository {
    conn: Arc<Mutex<Connection>>,
}

fn map_entity(row: &Row) -> SqliteResult<Entity> {
    Ok(Entity {
        entity_id: row.get(0)?,
        entity_name: row.get(1)?,
        oktmo: row.get(2)?,
        leader_name: row.get(3)?,
    })
}

impl EntityRepository {
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

    pub fn find_by_id(&self, entity_id: i64) -> RepositoryResult<Option<Entity>> {
        let conn = self.get_conn()?;
        let entity = conn
            .query_row(
                "SELECT entity_id, entity_name, oktmo, leader_name FROM dim_entity WHERE entity_id = ?1",
                params![entity_id],
                map_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// 全部主体 (按名称排序)
    pub fn list_all(&self) -> RepositoryResult<Vec<Entity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, entity_name, oktmo, leader_name FROM dim_entity ORDER BY entity_name",
        )?;
        let entities = stmt
            .query_map([], map_entity)?
            .collect::<SqliteResult<Vec<Entity>>>()?;
        Ok(entities)
    }

    pub fn list_ids(&self) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT entity_id FROM dim_entity ORDER BY entity_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn upsert(&self, entity: &Entity) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO dim_entity (entity_id, entity_name, oktmo, leader_name)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(entity_id) DO UPDATE SET
                entity_name = excluded.entity_name,
                oktmo = excluded.oktmo,
                leader_name = excluded.leader_name
            "#,
            params![entity.entity_id, entity.entity_name, entity.oktmo, entity.leader_name],
        )?;
        Ok(())
    }

    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM dim_entity", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ==========================================
// PeriodRepository - 评估周期仓储
// ==========================================
pub struct PeriodRepository {
    conn: Arc<Mutex<Connection>>,
}

type PeriodRow = (i64, String, String, String);

fn into_period(row: PeriodRow) -> RepositoryResult<Period> {
    let (period_id, period_type, date_from, date_to) = row;
    let period_type =
        PeriodType::from_str(&period_type).ok_or_else(|| RepositoryError::FieldValueError {
            field: "period_type".to_string(),
            message: format!("未知周期类型: {}", period_type),
        })?;
    Ok(Period {
        period_id,
        period_type,
        date_from: parse_date("date_from", &date_from)?,
        date_to: parse_date("date_to", &date_to)?,
    })
}

impl PeriodRepository {
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

    pub fn find_by_id(&self, period_id: i64) -> RepositoryResult<Option<Period>> {
        let conn = self.get_conn()?;
        let row: Option<PeriodRow> = conn
            .query_row(
                "SELECT period_id, period_type, date_from, date_to FROM dim_period WHERE period_id = ?1",
                params![period_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        row.map(into_period).transpose()
    }

    /// 全部周期 (按起始日期排序)
    pub fn list_all(&self) -> RepositoryResult<Vec<Period>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT period_id, period_type, date_from, date_to FROM dim_period ORDER BY date_from, period_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<SqliteResult<Vec<PeriodRow>>>()?;
        rows.into_iter().map(into_period).collect()
    }

    pub fn list_ids(&self) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT period_id FROM dim_period ORDER BY period_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqliteResult<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn upsert(&self, period: &Period) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO dim_period (period_id, period_type, date_from, date_to)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(period_id) DO UPDATE SET
                period_type = excluded.period_type,
                date_from = excluded.date_from,
                date_to = excluded.date_to
            "#,
            params![
                period.period_id,
                period.period_type.to_db_str(),
                period.date_from.format("%Y-%m-%d").to_string(),
                period.date_to.format("%Y-%m-%d").to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM dim_period", [], |row| row.get(0))?;
        Ok(count)
    }
}
