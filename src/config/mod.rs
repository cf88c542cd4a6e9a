// ==========================================
// 市级治理效能评分系统 - 配置层
// ==========================================
// 职责: 系统配置管理,支持按方法论版本覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod rating_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use rating_config_trait::RatingConfigReader;
