// ==========================================
// 市级治理效能评分系统 - API 层
// ==========================================
// 职责: 对外业务接口 (CLI / 上层服务调用)
// ==========================================

pub mod aggregation_api;
pub mod error;
pub mod import_api;
pub mod rating_api;

// 重导出核心类型
pub use aggregation_api::AggregationApi;
pub use error::{ApiError, ApiResult};
pub use import_api::{ImportApi, ImportSummary, ObservationInput, RejectedRow};
pub use rating_api::{
    CriteriaBlock, CriterionScore, DataStats, EntityComparison, EntityDetail, MethodologyInfo,
    RatingApi, RatingPage, RatingQuery, RatingRow, RatingSortField, SortOrder, ZoneReferenceRow,
};
