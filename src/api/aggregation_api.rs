// ==========================================
// 市级治理效能评分系统 - 聚合 API
// ==========================================
// 职责: 触发批量聚合 / 独立一致性修复 / 运行日志 / 数据质量标记
// 红线: 单元失败不升级为 API 错误, 只有存储不可用才返回 Err
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, RatingConfigReader};
use crate::domain::quality::{DataQualityFlag, FlagType};
use crate::domain::types::AggregationTrigger;
use crate::engine::{
    AggregationDriver, AggregationReport, AggregationScope, CancellationFlag, ConsistencyRepair,
    RatingRepositories, RepairReport, RepairScope,
};
use crate::repository::AggregationRunEntity;
use std::sync::Arc;
use tracing::info;

/// 运行日志 / 质量标记单次查询上限
pub const MAX_RUN_LIMIT: usize = 200;

pub struct AggregationApi {
    driver: Arc<AggregationDriver<ConfigManager>>,
    repos: Arc<RatingRepositories>,
    config: Arc<ConfigManager>,
}

impl AggregationApi {
    pub fn new(repos: Arc<RatingRepositories>, config: Arc<ConfigManager>) -> Self {
        Self {
            driver: Arc::new(AggregationDriver::new(repos.clone(), config.clone())),
            repos,
            config,
        }
    }

    /// 执行批量聚合
    ///
    /// # 参数
    /// - `scope`: 聚合范围 (None 字段表示全部)
    /// - `trigger`: 触发类型
    /// - `source`: 触发来源 (导入批次号 / 操作人等)
    pub async fn run_aggregation(
        &self,
        scope: &AggregationScope,
        trigger: AggregationTrigger,
        source: Option<&str>,
    ) -> ApiResult<AggregationReport> {
        self.run_aggregation_with_cancel(scope, trigger, source, &CancellationFlag::new())
            .await
    }

    /// 执行批量聚合 (可取消)
    pub async fn run_aggregation_with_cancel(
        &self,
        scope: &AggregationScope,
        trigger: AggregationTrigger,
        source: Option<&str>,
        cancel: &CancellationFlag,
    ) -> ApiResult<AggregationReport> {
        if let Some(ids) = &scope.entity_ids {
            if ids.is_empty() {
                return Err(ApiError::InvalidInput("entity_ids 不能为空列表".to_string()));
            }
            for id in ids {
                if self.repos.entity_repo.find_by_id(*id)?.is_none() {
                    return Err(ApiError::NotFound(format!("主体(id={})不存在", id)));
                }
            }
        }
        if let Some(p) = scope.period_id {
            if self.repos.period_repo.find_by_id(p)?.is_none() {
                return Err(ApiError::NotFound(format!("周期(id={})不存在", p)));
            }
        }
        if let Some(v) = scope.methodology_version_id {
            if !self.repos.methodology_repo.exists(v)? {
                return Err(ApiError::MissingMethodology(v));
            }
        }

        let report = self.driver.run(scope, trigger, source, cancel).await?;
        info!(
            run_id = %report.run_id,
            status = report.status().as_str(),
            "聚合请求完成"
        );
        Ok(report)
    }

    /// 独立执行一致性修复 (整个版本)
    pub async fn repair(&self, methodology_version_id: i64) -> ApiResult<RepairReport> {
        let prefixes = self
            .config
            .get_classification_prefixes(methodology_version_id)
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;

        let repair = ConsistencyRepair::new(self.repos.clone());
        let report = tokio::task::spawn_blocking(move || {
            repair.run(methodology_version_id, &RepairScope::default(), &prefixes, None)
        })
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))??;
        Ok(report)
    }

    /// 最近的运行日志
    pub fn recent_runs(&self, limit: usize) -> ApiResult<Vec<AggregationRunEntity>> {
        if limit == 0 || limit > MAX_RUN_LIMIT {
            return Err(ApiError::InvalidInput(format!(
                "limit 必须在 1..={} 之间, 实际 {}",
                MAX_RUN_LIMIT, limit
            )));
        }
        Ok(self.repos.run_repo.list_recent(limit)?)
    }

    /// 数据质量标记 (最新在前)
    pub fn quality_flags(
        &self,
        methodology_version_id: i64,
        limit: usize,
    ) -> ApiResult<Vec<DataQualityFlag>> {
        if limit == 0 || limit > MAX_RUN_LIMIT {
            return Err(ApiError::InvalidInput(format!(
                "limit 必须在 1..={} 之间, 实际 {}",
                MAX_RUN_LIMIT, limit
            )));
        }
        Ok(self
            .repos
            .quality_repo
            .list_by_version(methodology_version_id, limit)?)
    }

    /// 按类型统计标记 (可限定某次运行)
    pub fn quality_summary(
        &self,
        methodology_version_id: i64,
        run_id: Option<&str>,
    ) -> ApiResult<Vec<(FlagType, i64)>> {
        Ok(self
            .repos
            .quality_repo
            .count_by_type(methodology_version_id, run_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn api() -> AggregationApi {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = Arc::new(RatingRepositories::from_connection(conn.clone()));
        let config = Arc::new(ConfigManager::from_connection(conn).unwrap());
        AggregationApi::new(repos, config)
    }

    #[test]
    fn test_quality_flags_limit_is_bounded() {
        let api = api();
        assert!(api.quality_flags(1, 1).unwrap().is_empty());
        assert!(api.quality_flags(1, MAX_RUN_LIMIT).unwrap().is_empty());
        assert!(matches!(api.quality_flags(1, 0), Err(ApiError::InvalidInput(_))));
        assert!(matches!(
            api.quality_flags(1, MAX_RUN_LIMIT + 1),
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.quality_flags(1, usize::MAX),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_recent_runs_limit_is_bounded() {
        let api = api();
        assert!(api.recent_runs(20).unwrap().is_empty());
        assert!(matches!(api.recent_runs(0), Err(ApiError::InvalidInput(_))));
    }
}
