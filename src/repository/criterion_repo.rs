// ==========================================
// 市级治理效能评分系统 - 标准目录数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: dim_criterion 表的读写 (按方法论版本隔离)
// ==========================================

use crate::domain::criterion::Criterion;
use crate::domain::types::Classification;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

/// 按分类汇总的目录统计
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSummary {
    pub classification: Option<Classification>, // None = 未分类
    pub criteria_count: i64,
    pub max_points: f64, // 公开/封闭: Σpoint_max; 扣分: Σpoint_min (负数)
}

// ==========================================
// CriterionRepository - 评分标准仓储
// ==========================================
pub struct CriterionRepository {
    conn: Arc<Mutex<Connection>>,
}

const SELECT_COLUMNS: &str = r#"
    methodology_version_id, code, name, block, classification, point_min, point_max
"#;

fn map_row(row: &Row) -> SqliteResult<Criterion> {
    let classification: Option<String> = row.get(4)?;
    Ok(Criterion {
        methodology_version_id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        block: row.get(3)?,
        classification: classification.as_deref().and_then(Classification::from_str),
        point_min: row.get(5)?,
        point_max: row.get(6)?,
    })
}

impl CriterionRepository {
    /// 创建新的标准仓储实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: String) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(&db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按代码查询标准
    ///
    /// # 返回
    /// - Ok(Some(Criterion)): 找到
    /// - Ok(None): 该版本下未注册
    pub fn find_by_code(
        &self,
        methodology_version_id: i64,
        code: &str,
    ) -> RepositoryResult<Option<Criterion>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM dim_criterion WHERE methodology_version_id = ?1 AND code = ?2",
            SELECT_COLUMNS
        );
        let criterion = conn
            .query_row(&sql, params![methodology_version_id, code], map_row)
            .optional()?;
        Ok(criterion)
    }

    /// 查询某方法论版本的全部标准 (按代码排序)
    pub fn list_by_version(&self, methodology_version_id: i64) -> RepositoryResult<Vec<Criterion>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM dim_criterion WHERE methodology_version_id = ?1 ORDER BY code",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let criteria = stmt
            .query_map(params![methodology_version_id], map_row)?
            .collect::<SqliteResult<Vec<Criterion>>>()?;
        Ok(criteria)
    }

    /// 查询分类缺失的标准
    pub fn list_unclassified(&self, methodology_version_id: i64) -> RepositoryResult<Vec<Criterion>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM dim_criterion
             WHERE methodology_version_id = ?1 AND classification IS NULL
             ORDER BY code",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let criteria = stmt
            .query_map(params![methodology_version_id], map_row)?
            .collect::<SqliteResult<Vec<Criterion>>>()?;
        Ok(criteria)
    }

    /// 写入推断出的分类 (仅当原值为空时生效)
    ///
    /// # 返回
    /// - Ok(true): 已写入
    /// - Ok(false): 标准不存在或已有分类
    pub fn set_classification(
        &self,
        methodology_version_id: i64,
        code: &str,
        classification: Classification,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE dim_criterion
            SET classification = ?3, updated_at = datetime('now')
            WHERE methodology_version_id = ?1 AND code = ?2 AND classification IS NULL
            "#,
            params![methodology_version_id, code, classification.to_db_str()],
        )?;
        Ok(affected > 0)
    }

    /// 插入或更新标准定义 (方法论管理入口)
    pub fn upsert(&self, criterion: &Criterion) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO dim_criterion (
                methodology_version_id, code, name, block, classification, point_min, point_max
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(methodology_version_id, code) DO UPDATE SET
                name = excluded.name,
                block = excluded.block,
                classification = excluded.classification,
                point_min = excluded.point_min,
                point_max = excluded.point_max,
                updated_at = datetime('now')
            "#,
            params![
                criterion.methodology_version_id,
                criterion.code,
                criterion.name,
                criterion.block,
                criterion.classification.map(|c| c.to_db_str()),
                criterion.point_min,
                criterion.point_max,
            ],
        )?;
        Ok(())
    }

    /// 按分类汇总标准数量与满分
    pub fn summarize_by_classification(
        &self,
        methodology_version_id: i64,
    ) -> RepositoryResult<Vec<ClassificationSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                classification,
                COUNT(*),
                CASE WHEN classification = 'PENALTY'
                     THEN COALESCE(SUM(point_min), 0)
                     ELSE COALESCE(SUM(point_max), 0)
                END
            FROM dim_criterion
            WHERE methodology_version_id = ?1
            GROUP BY classification
            ORDER BY classification
            "#,
        )?;
        let rows = stmt
            .query_map(params![methodology_version_id], |row| {
                let classification: Option<String> = row.get(0)?;
                Ok(ClassificationSummary {
                    classification: classification.as_deref().and_then(Classification::from_str),
                    criteria_count: row.get(1)?,
                    max_points: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 标准总数
    pub fn count_all(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM dim_criterion", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> CriterionRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO dim_methodology (version_id, version, valid_from) VALUES (1, '1.0', '2024-01-01')",
            [],
        )
        .unwrap();
        CriterionRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn criterion(code: &str, classification: Option<Classification>, min: f64, max: f64) -> Criterion {
        Criterion {
            methodology_version_id: 1,
            code: code.to_string(),
            name: code.to_uppercase(),
            block: None,
            classification,
            point_min: min,
            point_max: max,
        }
    }

    #[test]
    fn test_set_classification_only_fills_null() {
        let repo = setup();
        repo.upsert(&criterion("pub_1", None, 0.0, 3.0)).unwrap();
        repo.upsert(&criterion("closed_1", Some(Classification::Closed), 0.0, 5.0))
            .unwrap();

        assert_eq!(repo.list_unclassified(1).unwrap().len(), 1);
        assert!(repo.set_classification(1, "pub_1", Classification::Public).unwrap());
        // 已有分类不覆盖
        assert!(!repo.set_classification(1, "closed_1", Classification::Public).unwrap());

        let closed = repo.find_by_code(1, "closed_1").unwrap().unwrap();
        assert_eq!(closed.classification, Some(Classification::Closed));
        assert!(repo.list_unclassified(1).unwrap().is_empty());
    }

    #[test]
    fn test_summarize_uses_penalty_minimum() {
        let repo = setup();
        repo.upsert(&criterion("pub_1", Some(Classification::Public), 0.0, 3.0)).unwrap();
        repo.upsert(&criterion("pub_2", Some(Classification::Public), 0.0, 6.0)).unwrap();
        repo.upsert(&criterion("pen_1", Some(Classification::Penalty), -5.0, 0.0)).unwrap();

        let summary = repo.summarize_by_classification(1).unwrap();
        let public = summary
            .iter()
            .find(|s| s.classification == Some(Classification::Public))
            .unwrap();
        let penalty = summary
            .iter()
            .find(|s| s.classification == Some(Classification::Penalty))
            .unwrap();
        assert_eq!(public.criteria_count, 2);
        assert_eq!(public.max_points, 9.0);
        assert_eq!(penalty.max_points, -5.0);
    }
}
