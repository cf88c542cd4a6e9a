// ==========================================
// 市级治理效能评分系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享连接、配置与 API 实例
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::api::{AggregationApi, ImportApi, RatingApi};
use crate::config::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::RatingRepositories;
use crate::perf::install_sqlite_tracing;

/// 应用状态
///
/// 所有仓储共享同一个连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理器
    pub config: Arc<ConfigManager>,

    /// 仓储集合
    pub repos: Arc<RatingRepositories>,

    /// 观测录入API
    pub import_api: Arc<ImportApi>,

    /// 评分查询API
    pub rating_api: Arc<RatingApi>,

    /// 聚合API
    pub aggregation_api: Arc<AggregationApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径 (":memory:" 用于测试)
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let mut conn =
            open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库结构初始化失败: {}", e))?;
        install_sqlite_tracing(&mut conn);
        let conn = Arc::new(Mutex::new(conn));

        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let repos = Arc::new(RatingRepositories::from_connection(conn.clone()));

        let import_api = Arc::new(ImportApi::new(repos.clone()));
        let rating_api = Arc::new(RatingApi::new(repos.clone(), config.clone()));
        let aggregation_api = Arc::new(AggregationApi::new(repos.clone(), config.clone()));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            conn,
            config,
            repos,
            import_api,
            rating_api,
            aggregation_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 MO_RATING_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("MO_RATING_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./mo_rating.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("mo-rating");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("mo_rating.db");
        }
    }

    path.to_string_lossy().to_string()
}
