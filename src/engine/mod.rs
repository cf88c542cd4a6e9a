// ==========================================
// 市级治理效能评分系统 - 引擎层
// ==========================================
// 职责: 一致性修复 → 聚合 → 区间分类 → 汇总写入
// 红线: Engine 不拼 SQL, 所有失败必须输出原因
// ==========================================

pub mod aggregator;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod repair;
pub mod repositories;
pub mod zone;

// 重导出核心引擎
pub use aggregator::{AggregationEngine, Aggregator};
pub use catalog::CriteriaCatalog;
pub use driver::{
    AggregationDriver, AggregationObserver, AggregationReport, AggregationScope,
    CancellationFlag, DriverOptions, UnitFailure,
};
pub use error::{EngineError, EngineResult};
pub use repair::{ConsistencyRepair, RepairReport, RepairScope};
pub use repositories::RatingRepositories;
pub use zone::{ZoneBand, ZoneClassifier};
