// ==========================================
// 市级治理效能评分系统 - 一致性修复
// ==========================================
// 职责: 聚合前保证 (1) 标准分类已解析 (2) 观测 score 非空
// 红线: 单条坏数据从不报错; 纠正后告警 + 写 data_quality_flag
// 红线: 幂等, 可在每次聚合前或定时执行
// 红线: 修复不改写越界/符号错误的分值, 只标记
// ==========================================

use crate::domain::observation::{Observation, ScoreResolution};
use crate::domain::quality::{DataQualityFlag, FlagType};
use crate::domain::types::{Classification, ClassificationPrefixes};
use crate::engine::catalog::CriteriaCatalog;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repositories::RatingRepositories;
use crate::perf::PerfGuard;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// 修复范围 (None 表示不限)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairScope {
    pub period_id: Option<i64>,
    pub entity_ids: Option<Vec<i64>>,
}

// ==========================================
// RepairReport - 修复报告
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub methodology_version_id: i64,
    pub criteria_classified: usize,       // 按前缀补齐分类
    pub scores_from_raw: usize,           // score ← raw_value
    pub scores_defaulted_to_zero: usize,  // score ← 0
    pub unresolved_criteria: Vec<String>, // 无法推断分类的标准代码
    pub out_of_range_scores: usize,       // 分值越界 (仅标记)
    pub penalty_sign_violations: usize,   // 扣分项为正 (仅标记)
}

impl RepairReport {
    /// 实际写回的纠正数
    pub fn corrections(&self) -> usize {
        self.criteria_classified + self.scores_from_raw + self.scores_defaulted_to_zero
    }

    /// 仅标记未纠正的异常数
    pub fn anomalies(&self) -> usize {
        self.unresolved_criteria.len() + self.out_of_range_scores + self.penalty_sign_violations
    }
}

// ==========================================
// ConsistencyRepair - 一致性修复
// ==========================================
#[derive(Clone)]
pub struct ConsistencyRepair {
    repos: Arc<RatingRepositories>,
}

impl ConsistencyRepair {
    pub fn new(repos: Arc<RatingRepositories>) -> Self {
        Self { repos }
    }

    /// 执行一致性修复
    ///
    /// # 参数
    /// - `methodology_version_id`: 方法论版本
    /// - `scope`: 观测范围 (分类修复始终覆盖整个版本目录)
    /// - `prefixes`: 标准代码前缀约定
    /// - `run_id`: 关联的聚合运行 (独立执行时为 None)
    ///
    /// # 返回
    /// - Ok(RepairReport)
    /// - Err(MissingMethodology): 版本不存在
    /// - Err(StoreUnavailable): 连接/锁/事务失败 (致命)
    pub fn run(
        &self,
        methodology_version_id: i64,
        scope: &RepairScope,
        prefixes: &ClassificationPrefixes,
        run_id: Option<&str>,
    ) -> EngineResult<RepairReport> {
        let _perf = PerfGuard::new("consistency_repair");
        if !self.repos.methodology_repo.exists(methodology_version_id)? {
            return Err(EngineError::MissingMethodology(methodology_version_id));
        }

        let mut report = RepairReport {
            methodology_version_id,
            ..Default::default()
        };
        let mut flags: Vec<DataQualityFlag> = Vec::new();

        // 1. 补齐标准分类
        self.repair_classifications(methodology_version_id, prefixes, run_id, &mut report, &mut flags)?;

        // 2-3. 回填观测分值, 并审计分值区间
        let catalog = CriteriaCatalog::load(&self.repos.criterion_repo, methodology_version_id)?;
        let observations = self.repos.observation_repo.list_in_scope(
            methodology_version_id,
            scope.period_id,
            scope.entity_ids.as_deref(),
        )?;
        let backfill = self.resolve_scores(&observations, &catalog, run_id, &mut report, &mut flags);

        self.repos.observation_repo.backfill_scores(&backfill)?;
        self.repos.quality_repo.insert_batch(&flags)?;

        if report.corrections() > 0 || report.anomalies() > 0 {
            info!(
                methodology_version_id,
                corrections = report.corrections(),
                anomalies = report.anomalies(),
                "一致性修复完成"
            );
        }
        Ok(report)
    }

    fn repair_classifications(
        &self,
        methodology_version_id: i64,
        prefixes: &ClassificationPrefixes,
        run_id: Option<&str>,
        report: &mut RepairReport,
        flags: &mut Vec<DataQualityFlag>,
    ) -> EngineResult<()> {
        for criterion in self.repos.criterion_repo.list_unclassified(methodology_version_id)? {
            match Classification::infer_from_code(&criterion.code, prefixes) {
                Some(classification) => {
                    let written = self.repos.criterion_repo.set_classification(
                        methodology_version_id,
                        &criterion.code,
                        classification,
                    )?;
                    if !written {
                        continue;
                    }
                    warn!(
                        methodology_version_id,
                        code = %criterion.code,
                        classification = classification.to_db_str(),
                        "标准分类缺失, 已按代码前缀补齐"
                    );
                    report.criteria_classified += 1;
                    flags.push(DataQualityFlag::for_criterion(
                        run_id,
                        methodology_version_id,
                        &criterion.code,
                        FlagType::MissingClassification,
                        format!("分类缺失, 推断为 {}", classification),
                    ));
                }
                None => {
                    warn!(
                        methodology_version_id,
                        code = %criterion.code,
                        "标准分类缺失且代码不匹配任何前缀"
                    );
                    report.unresolved_criteria.push(criterion.code.clone());
                    flags.push(DataQualityFlag::for_criterion(
                        run_id,
                        methodology_version_id,
                        &criterion.code,
                        FlagType::UnresolvedClassification,
                        format!(
                            "代码不匹配前缀 {} / {} / {}",
                            prefixes.public, prefixes.closed, prefixes.penalty
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// 解析空分值并审计区间 (不访问存储)
    fn resolve_scores(
        &self,
        observations: &[Observation],
        catalog: &CriteriaCatalog,
        run_id: Option<&str>,
        report: &mut RepairReport,
        flags: &mut Vec<DataQualityFlag>,
    ) -> Vec<(Observation, f64)> {
        let mut backfill = Vec::new();

        for obs in observations {
            let (score, resolution) = obs.resolved_score();
            let flag = |flag_type: FlagType, message: String| {
                DataQualityFlag::for_observation(
                    run_id,
                    obs.methodology_version_id,
                    obs.entity_id,
                    obs.period_id,
                    &obs.criterion_code,
                    flag_type,
                    message,
                )
            };

            match resolution {
                ScoreResolution::Recorded => {}
                ScoreResolution::FromRaw => {
                    warn!(
                        entity_id = obs.entity_id,
                        period_id = obs.period_id,
                        code = %obs.criterion_code,
                        raw_value = score,
                        "score 缺失, 回退为 raw_value"
                    );
                    report.scores_from_raw += 1;
                    flags.push(flag(FlagType::ScoreFromRaw, format!("score ← raw_value ({})", score)));
                    backfill.push((obs.clone(), score));
                }
                ScoreResolution::DefaultZero => {
                    warn!(
                        entity_id = obs.entity_id,
                        period_id = obs.period_id,
                        code = %obs.criterion_code,
                        "score 与 raw_value 均缺失, 记为 0"
                    );
                    report.scores_defaulted_to_zero += 1;
                    flags.push(flag(FlagType::ScoreDefaulted, "score ← 0".to_string()));
                    backfill.push((obs.clone(), score));
                }
            }

            // 区间审计 (未注册的标准由聚合阶段报告)
            let Ok(criterion) = catalog.get(&obs.criterion_code) else {
                continue;
            };
            if criterion.classification == Some(Classification::Penalty) && score > 0.0 {
                warn!(
                    entity_id = obs.entity_id,
                    code = %obs.criterion_code,
                    score,
                    "扣分项分值为正"
                );
                report.penalty_sign_violations += 1;
                flags.push(flag(
                    FlagType::PenaltySign,
                    format!("扣分项分值应 <= 0, 实际 {}", score),
                ));
            } else if !criterion.contains(score) {
                warn!(
                    entity_id = obs.entity_id,
                    code = %obs.criterion_code,
                    score,
                    point_min = criterion.point_min,
                    point_max = criterion.point_max,
                    "分值超出标准区间"
                );
                report.out_of_range_scores += 1;
                flags.push(flag(
                    FlagType::OutOfRange,
                    format!(
                        "分值 {} 超出 [{}, {}]",
                        score, criterion.point_min, criterion.point_max
                    ),
                ));
            }
        }

        backfill
    }
}
