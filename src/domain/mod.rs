// ==========================================
// 市级治理效能评分系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod aggregate;
pub mod criterion;
pub mod dimension;
pub mod methodology;
pub mod observation;
pub mod quality;
pub mod types;

// 重导出核心类型
pub use aggregate::{Aggregate, ScoreBreakdown, UnitKey, ZoneThresholds};
pub use criterion::Criterion;
pub use dimension::{Entity, Period};
pub use methodology::MethodologyVersion;
pub use observation::{Observation, ScoreResolution};
pub use quality::{DataQualityFlag, FlagSeverity, FlagType};
pub use types::{
    AggregationTrigger, Classification, ClassificationPrefixes, PeriodType, RunStatus, Zone,
};
