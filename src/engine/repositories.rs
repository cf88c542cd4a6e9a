// ==========================================
// 市级治理效能评分系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合评分引擎所需的所有 Repository
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    AggregateRepository, AggregationRunRepository, CriterionRepository, DataQualityRepository,
    EntityRepository, MethodologyRepository, ObservationRepository, PeriodRepository,
};

/// 评分引擎仓储集合
///
/// # 包含的仓储
/// - `methodology_repo`: 方法论版本
/// - `criterion_repo`: 标准目录
/// - `observation_repo`: 原始观测
/// - `aggregate_repo`: 汇总评分 (引擎唯一写入方)
/// - `entity_repo` / `period_repo`: 维度
/// - `quality_repo`: 数据质量标记
/// - `run_repo`: 聚合运行日志
#[derive(Clone)]
pub struct RatingRepositories {
    pub methodology_repo: Arc<MethodologyRepository>,
    pub criterion_repo: Arc<CriterionRepository>,
    pub observation_repo: Arc<ObservationRepository>,
    pub aggregate_repo: Arc<AggregateRepository>,
    pub entity_repo: Arc<EntityRepository>,
    pub period_repo: Arc<PeriodRepository>,
    pub quality_repo: Arc<DataQualityRepository>,
    pub run_repo: Arc<AggregationRunRepository>,
}

impl RatingRepositories {
    /// 基于共享连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            methodology_repo: Arc::new(MethodologyRepository::from_connection(conn.clone())),
            criterion_repo: Arc::new(CriterionRepository::from_connection(conn.clone())),
            observation_repo: Arc::new(ObservationRepository::from_connection(conn.clone())),
            aggregate_repo: Arc::new(AggregateRepository::from_connection(conn.clone())),
            entity_repo: Arc::new(EntityRepository::from_connection(conn.clone())),
            period_repo: Arc::new(PeriodRepository::from_connection(conn.clone())),
            quality_repo: Arc::new(DataQualityRepository::from_connection(conn.clone())),
            run_repo: Arc::new(AggregationRunRepository::from_connection(conn)),
        }
    }
}
