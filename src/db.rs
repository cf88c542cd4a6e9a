// ==========================================
// 市级治理效能评分系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键 + busy_timeout)
// - 幂等建表, 记录 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表 SQL (全部 IF NOT EXISTS, 可重复执行)
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS dim_methodology (
    version_id  INTEGER PRIMARY KEY,
    version     TEXT NOT NULL UNIQUE,
    valid_from  TEXT NOT NULL,
    valid_to    TEXT,
    notes       TEXT,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS dim_entity (
    entity_id   INTEGER PRIMARY KEY,
    entity_name TEXT NOT NULL UNIQUE,
    oktmo       TEXT,
    leader_name TEXT,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS dim_period (
    period_id   INTEGER PRIMARY KEY,
    period_type TEXT NOT NULL CHECK (period_type IN ('month', 'halfyear', 'year')),
    date_from   TEXT NOT NULL,
    date_to     TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS dim_criterion (
    methodology_version_id INTEGER NOT NULL REFERENCES dim_methodology(version_id),
    code                   TEXT NOT NULL,
    name                   TEXT NOT NULL,
    block                  TEXT,
    classification         TEXT CHECK (classification IN ('PUBLIC', 'CLOSED', 'PENALTY')),
    point_min              REAL NOT NULL,
    point_max              REAL NOT NULL,
    updated_at             TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (methodology_version_id, code)
);

CREATE TABLE IF NOT EXISTS fact_observation (
    entity_id              INTEGER NOT NULL REFERENCES dim_entity(entity_id),
    period_id              INTEGER NOT NULL REFERENCES dim_period(period_id),
    criterion_code         TEXT NOT NULL,
    methodology_version_id INTEGER NOT NULL,
    raw_value              REAL,
    score                  REAL,
    updated_at             TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_id, period_id, criterion_code, methodology_version_id),
    FOREIGN KEY (methodology_version_id, criterion_code)
        REFERENCES dim_criterion(methodology_version_id, code)
);

CREATE INDEX IF NOT EXISTS idx_fact_observation_unit
    ON fact_observation (methodology_version_id, period_id, entity_id);

CREATE TABLE IF NOT EXISTS fact_summary (
    entity_id              INTEGER NOT NULL REFERENCES dim_entity(entity_id),
    period_id              INTEGER NOT NULL REFERENCES dim_period(period_id),
    methodology_version_id INTEGER NOT NULL REFERENCES dim_methodology(version_id),
    score_public           REAL NOT NULL DEFAULT 0,
    score_closed           REAL NOT NULL DEFAULT 0,
    score_penalties        REAL NOT NULL DEFAULT 0,
    score_total            REAL NOT NULL DEFAULT 0,
    zone                   TEXT NOT NULL CHECK (zone IN ('GREEN', 'YELLOW', 'RED')),
    updated_at             TEXT NOT NULL,
    PRIMARY KEY (entity_id, period_id, methodology_version_id)
);

CREATE INDEX IF NOT EXISTS idx_fact_summary_rating
    ON fact_summary (methodology_version_id, period_id, score_total);

CREATE TABLE IF NOT EXISTS data_quality_flag (
    flag_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id                 TEXT,
    methodology_version_id INTEGER NOT NULL,
    entity_id              INTEGER,
    period_id              INTEGER,
    criterion_code         TEXT,
    flag_type              TEXT NOT NULL,
    severity               TEXT NOT NULL,
    message                TEXT NOT NULL,
    created_at             TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_data_quality_flag_version
    ON data_quality_flag (methodology_version_id, flag_type);

CREATE TABLE IF NOT EXISTS aggregation_run (
    run_id         TEXT PRIMARY KEY,
    trigger_type   TEXT NOT NULL,
    trigger_source TEXT,
    scope_json     TEXT NOT NULL,
    status         TEXT NOT NULL,
    succeeded      INTEGER NOT NULL DEFAULT 0,
    failed         INTEGER NOT NULL DEFAULT 0,
    repaired_json  TEXT,
    failures_json  TEXT,
    started_at     TEXT NOT NULL,
    completed_at   TEXT,
    duration_ms    INTEGER
);
"#;

/// 幂等建表并记录 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    if let Some(found) = read_schema_version(conn)? {
        if found != CURRENT_SCHEMA_VERSION {
            tracing::warn!(
                expected = CURRENT_SCHEMA_VERSION,
                found,
                "schema_version 与当前代码不一致"
            );
        }
    }
    Ok(())
}
