// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化 + 方法论/主体/周期/标准/观测 的测试数据
// ==========================================
#![allow(dead_code)]

use chrono::NaiveDate;
use mo_rating_engine::config::ConfigManager;
use mo_rating_engine::db::{ensure_schema, open_sqlite_connection};
use mo_rating_engine::domain::types::{Classification, PeriodType};
use mo_rating_engine::domain::{Criterion, Entity, MethodologyVersion, Observation, Period};
use mo_rating_engine::engine::RatingRepositories;
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 测试上下文: 共享连接 + 仓储集合 + 配置
pub struct TestContext {
    pub _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub repos: Arc<RatingRepositories>,
    pub config: Arc<ConfigManager>,
}

pub fn setup() -> TestContext {
    let (temp_file, db_path) = create_test_db().unwrap();
    let conn = Arc::new(Mutex::new(open_sqlite_connection(&db_path).unwrap()));
    let repos = Arc::new(RatingRepositories::from_connection(conn.clone()));
    let config = Arc::new(ConfigManager::from_connection(conn.clone()).unwrap());
    TestContext {
        _temp_file: temp_file,
        db_path,
        conn,
        repos,
        config,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn insert_methodology(repos: &RatingRepositories, version_id: i64) {
    repos
        .methodology_repo
        .upsert(&MethodologyVersion {
            version_id,
            version: format!("{}.0", version_id),
            valid_from: date(2025, 1, 1),
            valid_to: None,
            notes: None,
        })
        .unwrap();
}

pub fn insert_entity(repos: &RatingRepositories, entity_id: i64, name: &str) {
    repos
        .entity_repo
        .upsert(&Entity {
            entity_id,
            entity_name: name.to_string(),
            oktmo: Some(format!("46{:06}", entity_id)),
            leader_name: Some(format!("Глава {}", entity_id)),
        })
        .unwrap();
}

pub fn insert_period(repos: &RatingRepositories, period_id: i64) {
    repos
        .period_repo
        .upsert(&Period {
            period_id,
            period_type: PeriodType::HalfYear,
            date_from: date(2025, 1, 1),
            date_to: date(2025, 6, 30),
        })
        .unwrap();
}

pub fn insert_criterion(
    repos: &RatingRepositories,
    version_id: i64,
    code: &str,
    classification: Option<Classification>,
    point_min: f64,
    point_max: f64,
) {
    repos
        .criterion_repo
        .upsert(&Criterion {
            methodology_version_id: version_id,
            code: code.to_string(),
            name: format!("Критерий {}", code),
            block: None,
            classification,
            point_min,
            point_max,
        })
        .unwrap();
}

/// 把已注册标准归入板块
pub fn set_block(repos: &RatingRepositories, version_id: i64, code: &str, block: &str) {
    let mut criterion = repos
        .criterion_repo
        .find_by_code(version_id, code)
        .unwrap()
        .unwrap();
    criterion.block = Some(block.to_string());
    repos.criterion_repo.upsert(&criterion).unwrap();
}

/// 标准目录: 2 公开 + 2 封闭 + 2 扣分
pub fn insert_standard_catalog(repos: &RatingRepositories, version_id: i64) {
    insert_criterion(repos, version_id, "pub_1", Some(Classification::Public), 0.0, 30.0);
    insert_criterion(repos, version_id, "pub_2", Some(Classification::Public), 0.0, 30.0);
    insert_criterion(repos, version_id, "closed_1", Some(Classification::Closed), 0.0, 30.0);
    insert_criterion(repos, version_id, "closed_2", Some(Classification::Closed), 0.0, 30.0);
    insert_criterion(repos, version_id, "pen_1", Some(Classification::Penalty), -10.0, 0.0);
    insert_criterion(repos, version_id, "pen_2", Some(Classification::Penalty), -10.0, 0.0);
}

pub fn insert_observation(
    repos: &RatingRepositories,
    entity_id: i64,
    period_id: i64,
    version_id: i64,
    code: &str,
    raw_value: Option<f64>,
    score: Option<f64>,
) {
    repos
        .observation_repo
        .upsert(&Observation {
            entity_id,
            period_id,
            criterion_code: code.to_string(),
            methodology_version_id: version_id,
            raw_value,
            score,
        })
        .unwrap();
}

pub fn insert_scores(
    repos: &RatingRepositories,
    entity_id: i64,
    period_id: i64,
    version_id: i64,
    scores: &[(&str, f64)],
) {
    for (code, score) in scores {
        insert_observation(repos, entity_id, period_id, version_id, code, None, Some(*score));
    }
}

/// 基础数据集: 版本 1, 周期 1, 主体 1..=n, 标准目录
pub fn seed_base(repos: &RatingRepositories, entity_count: i64) {
    insert_methodology(repos, 1);
    insert_period(repos, 1);
    insert_standard_catalog(repos, 1);
    for id in 1..=entity_count {
        insert_entity(repos, id, &format!("МО {:02}", id));
    }
}

/// fact_summary 全表文本快照 (按键排序)
pub fn summary_snapshot(conn: &Arc<Mutex<Connection>>) -> Vec<String> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT entity_id, period_id, methodology_version_id, score_public, score_closed, \
             score_penalties, score_total, zone, updated_at \
             FROM fact_summary ORDER BY methodology_version_id, period_id, entity_id",
        )
        .unwrap();
    let rows = stmt
        .query_map([], |row| {
            Ok(format!(
                "{}|{}|{}|{:?}|{:?}|{:?}|{:?}|{}|{}",
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    rows
}
