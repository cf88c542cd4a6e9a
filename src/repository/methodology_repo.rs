// ==========================================
// 市级治理效能评分系统 - 方法论版本数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::methodology::MethodologyVersion;
use crate::repository::error::{parse_date, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 数据库原始行 (日期仍为字符串)
type MethodologyRow = (i64, String, String, Option<String>, Option<String>);

fn into_domain(row: MethodologyRow) -> RepositoryResult<MethodologyVersion> {
    let (version_id, version, valid_from, valid_to, notes) = row;
    Ok(MethodologyVersion {
        version_id,
        version,
        valid_from: parse_date("valid_from", &valid_from)?,
        valid_to: valid_to
            .as_deref()
            .map(|raw| parse_date("valid_to", raw))
            .transpose()?,
        notes,
    })
}

// ==========================================
// MethodologyRepository - 方法论版本仓储
// ==========================================
pub struct MethodologyRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MethodologyRepository {
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

    /// 按 ID 查询方法论版本
    pub fn find_by_id(&self, version_id: i64) -> RepositoryResult<Option<MethodologyVersion>> {
        let conn = self.get_conn()?;
        let row: Option<MethodologyRow> = conn
            .query_row(
                "SELECT version_id, version, valid_from, valid_to, notes
                 FROM dim_methodology WHERE version_id = ?1",
                params![version_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(into_domain).transpose()
    }

    /// 全部版本 (最新生效的在前)
    pub fn list_all(&self) -> RepositoryResult<Vec<MethodologyVersion>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT version_id, version, valid_from, valid_to, notes
             FROM dim_methodology ORDER BY valid_from DESC, version_id DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<rusqlite::Result<Vec<MethodologyRow>>>()?;
        rows.into_iter().map(into_domain).collect()
    }

    /// 全部版本 ID (升序)
    pub fn list_ids(&self) -> RepositoryResult<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT version_id FROM dim_methodology ORDER BY version_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn exists(&self, version_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM dim_methodology WHERE version_id = ?1",
                params![version_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// 插入或更新方法论版本
    pub fn upsert(&self, methodology: &MethodologyVersion) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO dim_methodology (version_id, version, valid_from, valid_to, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(version_id) DO UPDATE SET
                version = excluded.version,
                valid_from = excluded.valid_from,
                valid_to = excluded.valid_to,
                notes = excluded.notes
            "#,
            params![
                methodology.version_id,
                methodology.version,
                methodology.valid_from.format("%Y-%m-%d").to_string(),
                methodology.valid_to.map(|d| d.format("%Y-%m-%d").to_string()),
                methodology.notes,
            ],
        )?;
        Ok(())
    }

    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM dim_methodology", [], |row| row.get(0))?;
        Ok(count)
    }
}
