// ==========================================
// 市级治理效能评分系统 - 评分聚合引擎
// ==========================================
// 输入: 单元观测 + 标准目录 + 区间阈值
// 输出: fact_summary 行
// ==========================================
// 红线: score_total = max(0, public + closed + penalties)
// 红线: 零观测单元 → 全 0 汇总 + RED, 而不是缺行
// 红线: 求和按标准代码的规范顺序进行, 结果与读取顺序无关
// ==========================================

use crate::domain::aggregate::{Aggregate, ScoreBreakdown, UnitKey, ZoneThresholds};
use crate::domain::observation::Observation;
use crate::domain::types::Classification;
use crate::engine::catalog::CriteriaCatalog;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::RatingRepositories;
use crate::engine::zone::ZoneClassifier;
use std::sync::Arc;
use tracing::{debug, error};

/// 分项校验容差
const EXHAUSTIVENESS_EPSILON: f64 = 1e-9;

// ==========================================
// Aggregator - 纯聚合函数
// ==========================================
pub struct Aggregator {
    zone_classifier: ZoneClassifier,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            zone_classifier: ZoneClassifier::new(),
        }
    }

    /// 将单元观测折叠为分项汇总
    ///
    /// # 参数
    /// - `observations`: 单元内全部观测 (顺序任意)
    /// - `catalog`: 该方法论版本的标准目录
    /// - `thresholds`: 风险区间阈值
    ///
    /// # 返回
    /// - Ok(ScoreBreakdown)
    /// - Err(UnknownCriterion / UnclassifiedCriterion): 观测引用的标准不可用
    ///
    /// # 说明
    /// score 为空的观测按 raw_value → 0 的顺序解析, 与一致性修复的回填规则一致
    pub fn fold(
        &self,
        observations: &[Observation],
        catalog: &CriteriaCatalog,
        thresholds: &ZoneThresholds,
    ) -> EngineResult<ScoreBreakdown> {
        // 规范顺序: 标准代码 → 主体 → 周期
        let mut ordered: Vec<&Observation> = observations.iter().collect();
        ordered.sort_by(|a, b| {
            a.criterion_code
                .cmp(&b.criterion_code)
                .then(a.entity_id.cmp(&b.entity_id))
                .then(a.period_id.cmp(&b.period_id))
        });

        let mut score_public = 0.0_f64;
        let mut score_closed = 0.0_f64;
        let mut score_penalties = 0.0_f64;
        let mut observed_sum = 0.0_f64;

        for obs in &ordered {
            let classification = catalog.classify(&obs.criterion_code)?;
            let (score, _) = obs.resolved_score();
            match classification {
                Classification::Public => score_public += score,
                Classification::Closed => score_closed += score,
                Classification::Penalty => score_penalties += score,
            }
            observed_sum += score;
        }

        let pre_floor = score_public + score_closed + score_penalties;
        if (pre_floor - observed_sum).abs() > EXHAUSTIVENESS_EPSILON * observed_sum.abs().max(1.0) {
            error!(
                pre_floor,
                observed_sum,
                observation_count = ordered.len(),
                "分项合计与观测总和不一致"
            );
        }

        // 保底为 0 (避免 -0.0 进入存储)
        let score_total = if pre_floor > 0.0 { pre_floor } else { 0.0 };
        let zone = self.zone_classifier.classify(score_total, thresholds);

        Ok(ScoreBreakdown {
            score_public,
            score_closed,
            score_penalties,
            score_total,
            zone,
            observation_count: ordered.len(),
        })
    }
}

// ==========================================
// AggregationEngine - 单元聚合 (读取 → 折叠 → 写入)
// ==========================================
#[derive(Clone)]
pub struct AggregationEngine {
    repos: Arc<RatingRepositories>,
}

impl AggregationEngine {
    pub fn new(repos: Arc<RatingRepositories>) -> Self {
        Self { repos }
    }

    /// 加载方法论版本的目录
    ///
    /// # 返回
    /// - Err(MissingMethodology): 版本不存在
    pub fn load_catalog(&self, methodology_version_id: i64) -> EngineResult<CriteriaCatalog> {
        if !self.repos.methodology_repo.exists(methodology_version_id)? {
            return Err(EngineError::MissingMethodology(methodology_version_id));
        }
        CriteriaCatalog::load(&self.repos.criterion_repo, methodology_version_id)
    }

    /// 计算单元汇总 (不写入)
    pub fn compute_with_catalog(
        &self,
        key: UnitKey,
        catalog: &CriteriaCatalog,
        thresholds: &ZoneThresholds,
    ) -> EngineResult<Aggregate> {
        if catalog.methodology_version_id() != key.methodology_version_id {
            return Err(EngineError::InvalidConfig(format!(
                "目录版本 {} 与单元版本 {} 不一致",
                catalog.methodology_version_id(),
                key.methodology_version_id
            )));
        }
        let observations = self.repos.observation_repo.fetch_observations(
            key.entity_id,
            key.period_id,
            key.methodology_version_id,
        )?;
        let breakdown = Aggregator::new().fold(&observations, catalog, thresholds)?;
        debug!(
            unit = %key,
            observations = breakdown.observation_count,
            score_total = breakdown.score_total,
            zone = breakdown.zone.as_str(),
            "单元聚合完成"
        );
        Ok(Aggregate::from_breakdown(key, &breakdown))
    }

    /// 计算并写入单元汇总
    pub fn aggregate_with_catalog(
        &self,
        key: UnitKey,
        catalog: &CriteriaCatalog,
        thresholds: &ZoneThresholds,
    ) -> EngineResult<Aggregate> {
        let aggregate = self.compute_with_catalog(key, catalog, thresholds)?;
        Ok(self.repos.aggregate_repo.upsert(&aggregate)?)
    }

    /// 计算单元汇总 (不写入, 自行加载目录)
    pub fn compute(
        &self,
        entity_id: i64,
        period_id: i64,
        methodology_version_id: i64,
        thresholds: &ZoneThresholds,
    ) -> EngineResult<Aggregate> {
        let catalog = self.load_catalog(methodology_version_id)?;
        self.compute_with_catalog(
            UnitKey::new(entity_id, period_id, methodology_version_id),
            &catalog,
            thresholds,
        )
    }

    /// 聚合单个 (主体, 周期, 版本) 并写入 fact_summary
    ///
    /// # 返回
    /// - Ok(Aggregate): 写入后的行
    /// - Err(MissingMethodology): 版本不存在 (仅影响本次调用)
    /// - Err(StoreUnavailable): 存储不可用
    pub fn aggregate(
        &self,
        entity_id: i64,
        period_id: i64,
        methodology_version_id: i64,
        thresholds: &ZoneThresholds,
    ) -> EngineResult<Aggregate> {
        let catalog = self.load_catalog(methodology_version_id)?;
        self.aggregate_with_catalog(
            UnitKey::new(entity_id, period_id, methodology_version_id),
            &catalog,
            thresholds,
        )
    }
}
