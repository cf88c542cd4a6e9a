// ==========================================
// 市级治理效能评分系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 作用域: global / methodology/{version_id}
// ==========================================

use crate::config::rating_config_trait::RatingConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::aggregate::ZoneThresholds;
use crate::domain::types::ClassificationPrefixes;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                                    // 全局
    Methodology { methodology_version_id: i64 }, // 方法论版本
}

impl ConfigScope {
    /// config_kv.scope_id 取值
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Methodology {
                methodology_version_id,
            } => format!("methodology/{}", methodology_version_id),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取指定作用域的配置值
    fn get_scoped_value(&self, scope: &ConfigScope, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_scoped_value(&ConfigScope::Global, key)
    }

    /// 按作用域回退读取: methodology/{id} → global
    fn get_for_methodology(
        &self,
        methodology_version_id: i64,
        key: &str,
    ) -> Result<Option<String>, Box<dyn Error>> {
        let scope = ConfigScope::Methodology {
            methodology_version_id,
        };
        match self.get_scoped_value(&scope, key)? {
            Some(v) => Ok(Some(v)),
            None => self.get_global_config_value(key),
        }
    }

    /// 写入配置值 (UPSERT)
    pub fn set_config_value(&self, scope: &ConfigScope, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 读取数值型配置, 格式错误时告警并回退默认值
    fn parse_or_default<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
        match raw {
            None => default,
            Some(value) => match value.trim().parse::<T>() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(
                        config_key = key,
                        raw_value = %value,
                        "配置格式错误，使用默认值"
                    );
                    default
                }
            },
        }
    }

    /// 获取所有 global 配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 记录一次聚合运行所依据的配置
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复 global 配置
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.unchecked_transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

// ==========================================
// RatingConfigReader Trait 实现
// ==========================================
#[async_trait]
impl RatingConfigReader for ConfigManager {
    // ===== 风险区间配置 =====

    async fn get_zone_thresholds(
        &self,
        methodology_version_id: i64,
    ) -> Result<ZoneThresholds, Box<dyn Error>> {
        let defaults = ZoneThresholds::default();
        let green_min = Self::parse_or_default(
            config_keys::ZONE_GREEN_MIN,
            self.get_for_methodology(methodology_version_id, config_keys::ZONE_GREEN_MIN)?,
            defaults.green_min,
        );
        let yellow_min = Self::parse_or_default(
            config_keys::ZONE_YELLOW_MIN,
            self.get_for_methodology(methodology_version_id, config_keys::ZONE_YELLOW_MIN)?,
            defaults.yellow_min,
        );
        Ok(ZoneThresholds {
            green_min,
            yellow_min,
        })
    }

    // ===== 标准分类配置 =====

    async fn get_classification_prefixes(
        &self,
        methodology_version_id: i64,
    ) -> Result<ClassificationPrefixes, Box<dyn Error>> {
        let defaults = ClassificationPrefixes::default();
        let read = |key: &str, default: String| -> Result<String, Box<dyn Error>> {
            Ok(self
                .get_for_methodology(methodology_version_id, key)?
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default))
        };
        Ok(ClassificationPrefixes {
            public: read(config_keys::CRITERION_PREFIX_PUBLIC, defaults.public)?,
            closed: read(config_keys::CRITERION_PREFIX_CLOSED, defaults.closed)?,
            penalty: read(config_keys::CRITERION_PREFIX_PENALTY, defaults.penalty)?,
        })
    }

    // ===== 批量聚合配置 =====

    async fn get_aggregation_parallelism(&self) -> Result<usize, Box<dyn Error>> {
        let raw = self.get_global_config_value(config_keys::AGGREGATION_PARALLELISM)?;
        let value = Self::parse_or_default(config_keys::AGGREGATION_PARALLELISM, raw, 4usize);
        Ok(value.max(1))
    }

    async fn get_aggregation_transactional(&self) -> Result<bool, Box<dyn Error>> {
        let raw = self.get_global_config_value(config_keys::AGGREGATION_TRANSACTIONAL)?;
        Ok(match raw {
            None => true,
            Some(v) => matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            ),
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 风险区间 (可按方法论版本覆写)
    pub const ZONE_GREEN_MIN: &str = "zone_green_min";
    pub const ZONE_YELLOW_MIN: &str = "zone_yellow_min";

    // 标准代码前缀 (可按方法论版本覆写)
    pub const CRITERION_PREFIX_PUBLIC: &str = "criterion_prefix_public";
    pub const CRITERION_PREFIX_CLOSED: &str = "criterion_prefix_closed";
    pub const CRITERION_PREFIX_PENALTY: &str = "criterion_prefix_penalty";

    // 批量聚合 (仅 global)
    pub const AGGREGATION_PARALLELISM: &str = "aggregation_parallelism";
    pub const AGGREGATION_TRANSACTIONAL: &str = "aggregation_transactional";
}
