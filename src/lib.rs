// ==========================================
// 市级治理效能评分系统 - 核心库
// ==========================================
// 职责: 市级主体治理效能评分的聚合与分区
// 技术栈: Rust + SQLite
// 数据流: 观测 → 一致性修复 → 聚合 → 风险区间 → 汇总 (fact_summary)
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "ru");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 聚合规则
pub mod engine;

// 配置层 - 阈值/前缀/批处理参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能观测
pub mod perf;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 共享状态
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AggregationTrigger, Classification, PeriodType, RunStatus, Zone};

// 领域实体
pub use domain::{
    Aggregate, Criterion, DataQualityFlag, Entity, MethodologyVersion, Observation, Period,
    ScoreBreakdown, UnitKey, ZoneThresholds,
};

// 引擎
pub use engine::{
    AggregationDriver, AggregationEngine, Aggregator, ConsistencyRepair, CriteriaCatalog,
    ZoneClassifier,
};

// API
pub use api::{AggregationApi, ImportApi, RatingApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "Рейтинг эффективности МО";
