// ==========================================
// 市级治理效能评分系统 - 导入边界 API
// ==========================================
// 职责: 导入方写观测、方法论管理员写目录/维度
// 红线: 扣分项分值存储为非正数, 在此边界强制
// 红线: 观测的标准代码必须已在对应方法论版本注册
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::criterion::Criterion;
use crate::domain::dimension::{Entity, Period};
use crate::domain::methodology::MethodologyVersion;
use crate::domain::observation::Observation;
use crate::domain::types::Classification;
use crate::engine::RatingRepositories;
use crate::perf::PerfGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// 观测写入请求 (导入方提供的行)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationInput {
    pub entity_id: i64,
    pub period_id: i64,
    pub criterion_code: String,
    pub methodology_version_id: i64,
    pub raw_value: Option<f64>,
    pub score: Option<f64>, // 可选, 引擎按 raw_value → 0 回填
}

/// 批量写入结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub accepted: usize,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub row_index: usize,
    pub criterion_code: String,
    pub reason: String,
}

// ==========================================
// ImportApi - 导入边界 API
// ==========================================
pub struct ImportApi {
    repos: Arc<RatingRepositories>,
}

impl ImportApi {
    pub fn new(repos: Arc<RatingRepositories>) -> Self {
        Self { repos }
    }

    // ==========================================
    // 观测写入
    // ==========================================

    /// 写入单条观测 (按复合键覆盖)
    ///
    /// # 校验
    /// - 方法论版本、主体、周期存在
    /// - 标准代码已在该版本注册 (UnknownCriterion)
    /// - score 存在时: 有限数; 扣分项 <= 0; 落在 [point_min, point_max]
    pub fn record_observation(&self, input: &ObservationInput) -> ApiResult<()> {
        self.validate_observation(input)?;
        self.repos.observation_repo.upsert(&Observation {
            entity_id: input.entity_id,
            period_id: input.period_id,
            criterion_code: input.criterion_code.clone(),
            methodology_version_id: input.methodology_version_id,
            raw_value: input.raw_value,
            score: input.score,
        })?;
        Ok(())
    }

    /// 批量写入观测 (逐行校验, 坏行不影响其他行)
    pub fn record_observations(&self, inputs: &[ObservationInput]) -> ApiResult<ImportSummary> {
        let _perf = PerfGuard::new("record_observations");
        let mut summary = ImportSummary::default();
        for (row_index, input) in inputs.iter().enumerate() {
            match self.record_observation(input) {
                Ok(()) => summary.accepted += 1,
                Err(e @ ApiError::DatabaseConnectionError(_))
                | Err(e @ ApiError::DatabaseTransactionError(_)) => return Err(e),
                Err(e) => {
                    warn!(row_index, code = %input.criterion_code, error = %e, "观测行被拒绝");
                    summary.rejected.push(RejectedRow {
                        row_index,
                        criterion_code: input.criterion_code.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            accepted = summary.accepted,
            rejected = summary.rejected.len(),
            "观测批量写入完成"
        );
        Ok(summary)
    }

    fn validate_observation(&self, input: &ObservationInput) -> ApiResult<()> {
        if input.criterion_code.trim().is_empty() {
            return Err(ApiError::InvalidInput("标准代码不能为空".to_string()));
        }
        if !self.repos.methodology_repo.exists(input.methodology_version_id)? {
            return Err(ApiError::MissingMethodology(input.methodology_version_id));
        }
        if self.repos.entity_repo.find_by_id(input.entity_id)?.is_none() {
            return Err(ApiError::NotFound(format!("主体(id={})不存在", input.entity_id)));
        }
        if self.repos.period_repo.find_by_id(input.period_id)?.is_none() {
            return Err(ApiError::NotFound(format!("周期(id={})不存在", input.period_id)));
        }

        let criterion = self
            .repos
            .criterion_repo
            .find_by_code(input.methodology_version_id, &input.criterion_code)?
            .ok_or_else(|| ApiError::UnknownCriterion {
                methodology_version_id: input.methodology_version_id,
                code: input.criterion_code.clone(),
            })?;

        if let Some(raw) = input.raw_value {
            if !raw.is_finite() {
                return Err(ApiError::InvalidInput(format!("raw_value 非有限数: {}", raw)));
            }
        }
        if let Some(score) = input.score {
            if !score.is_finite() {
                return Err(ApiError::InvalidInput(format!("score 非有限数: {}", score)));
            }
            if criterion.classification == Some(Classification::Penalty) && score > 0.0 {
                return Err(ApiError::PenaltySignViolation {
                    code: criterion.code,
                    score,
                });
            }
            if !criterion.contains(score) {
                return Err(ApiError::ScoreOutOfRange {
                    code: criterion.code,
                    score,
                    point_min: criterion.point_min,
                    point_max: criterion.point_max,
                });
            }
        }
        Ok(())
    }

    // ==========================================
    // 目录与维度 (方法论管理)
    // ==========================================

    /// 注册或更新评分标准
    ///
    /// # 校验
    /// - point_min <= point_max
    /// - 扣分项 point_max <= 0; 公开/封闭 point_min >= 0
    /// - 分类允许为空 (由一致性修复按前缀补齐)
    pub fn register_criterion(&self, criterion: &Criterion) -> ApiResult<()> {
        if criterion.code.trim().is_empty() || criterion.name.trim().is_empty() {
            return Err(ApiError::InvalidInput("标准代码与名称不能为空".to_string()));
        }
        if !(criterion.point_min.is_finite() && criterion.point_max.is_finite())
            || criterion.point_min > criterion.point_max
        {
            return Err(ApiError::InvalidInput(format!(
                "分值区间无效: [{}, {}]",
                criterion.point_min, criterion.point_max
            )));
        }
        match criterion.classification {
            Some(Classification::Penalty) if criterion.point_max > 0.0 => {
                return Err(ApiError::PenaltySignViolation {
                    code: criterion.code.clone(),
                    score: criterion.point_max,
                });
            }
            Some(Classification::Public) | Some(Classification::Closed)
                if criterion.point_min < 0.0 =>
            {
                return Err(ApiError::InvalidInput(format!(
                    "非扣分标准的下限不能为负: {}",
                    criterion.code
                )));
            }
            _ => {}
        }
        if !self.repos.methodology_repo.exists(criterion.methodology_version_id)? {
            return Err(ApiError::MissingMethodology(criterion.methodology_version_id));
        }
        self.repos.criterion_repo.upsert(criterion)?;
        Ok(())
    }

    /// 注册或更新方法论版本
    pub fn register_methodology(&self, methodology: &MethodologyVersion) -> ApiResult<()> {
        if methodology.version.trim().is_empty() {
            return Err(ApiError::InvalidInput("版本名不能为空".to_string()));
        }
        if let Some(valid_to) = methodology.valid_to {
            if valid_to < methodology.valid_from {
                return Err(ApiError::InvalidInput(format!(
                    "失效日期 {} 早于生效日期 {}",
                    valid_to, methodology.valid_from
                )));
            }
        }
        self.repos.methodology_repo.upsert(methodology)?;
        Ok(())
    }

    /// 注册或更新被评主体
    pub fn register_entity(&self, entity: &Entity) -> ApiResult<()> {
        if entity.entity_name.trim().is_empty() {
            return Err(ApiError::InvalidInput("主体名称不能为空".to_string()));
        }
        self.repos.entity_repo.upsert(entity)?;
        Ok(())
    }

    /// 注册或更新评估周期
    pub fn register_period(&self, period: &Period) -> ApiResult<()> {
        if period.date_to < period.date_from {
            return Err(ApiError::InvalidInput(format!(
                "周期结束日期 {} 早于开始日期 {}",
                period.date_to, period.date_from
            )));
        }
        self.repos.period_repo.upsert(period)?;
        Ok(())
    }
}
