// ==========================================
// 市级治理效能评分系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod aggregate_repo;
pub mod aggregation_run_repo;
pub mod criterion_repo;
pub mod dimension_repo;
pub mod error;
pub mod methodology_repo;
pub mod observation_repo;
pub mod quality_repo;

// 重导出核心仓储
pub use aggregate_repo::{AggregateRepository, RatingRecord};
pub use aggregation_run_repo::{AggregationRunEntity, AggregationRunRepository};
pub use criterion_repo::{ClassificationSummary, CriterionRepository};
pub use dimension_repo::{EntityRepository, PeriodRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use methodology_repo::MethodologyRepository;
pub use observation_repo::{ObservationRepository, PeriodCount};
pub use quality_repo::DataQualityRepository;
