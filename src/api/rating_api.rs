// ==========================================
// 市级治理效能评分系统 - 读侧 API
// ==========================================
// 职责: 评分表 / 主体明细 / 主体对比 / 区间参考 / 方法论说明 / 数据统计 / CSV 导出
// 红线: 只读; 输出扁平结构, 不暴露引擎内部类型
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, RatingConfigReader};
use crate::domain::methodology::MethodologyVersion;
use crate::domain::types::{Classification, Zone};
use crate::engine::{RatingRepositories, ZoneClassifier};
use crate::perf::PerfGuard;
use crate::repository::{PeriodCount, RatingRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

/// 单页最大行数
pub const MAX_PAGE_SIZE: usize = 500;

// ==========================================
// 查询参数
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingSortField {
    ScoreTotal,
    ScorePublic,
    ScoreClosed,
    EntityName,
}

impl RatingSortField {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "score_total" | "total" => Some(RatingSortField::ScoreTotal),
            "score_public" | "public" => Some(RatingSortField::ScorePublic),
            "score_closed" | "closed" => Some(RatingSortField::ScoreClosed),
            "entity_name" | "name" => Some(RatingSortField::EntityName),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingQuery {
    pub methodology_version_id: i64,
    pub period_id: i64,
    pub zone: Option<Zone>,
    pub sort_by: RatingSortField,
    pub order: SortOrder,
    pub page: usize,      // 从 1 开始
    pub page_size: usize, // 1..=500
}

impl RatingQuery {
    pub fn new(methodology_version_id: i64, period_id: i64) -> Self {
        Self {
            methodology_version_id,
            period_id,
            zone: None,
            sort_by: RatingSortField::ScoreTotal,
            order: SortOrder::Desc,
            page: 1,
            page_size: 50,
        }
    }
}

// ==========================================
// 响应结构
// ==========================================

/// 评分表行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRow {
    pub rank: usize, // 按 score_total 降序的名次 (同分同名次)
    pub entity_id: i64,
    pub entity_name: String,
    pub leader_name: Option<String>,
    pub period_id: i64,
    pub methodology_version_id: i64,
    pub score_public: f64,
    pub score_closed: f64,
    pub score_penalties: f64,
    pub score_total: f64,
    pub zone: Zone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingPage {
    pub rows: Vec<RatingRow>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// 明细视图: 单个标准的得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub code: String,
    pub name: String,
    pub classification: Option<Classification>,
    pub score: f64,
    pub observed: bool, // false: 该单元没有这条观测, 按 0 计
}

/// 明细视图: 板块及小计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaBlock {
    pub block: Option<String>, // None: 未归属板块
    pub label: String,
    pub score: f64,
    pub criteria: Vec<CriterionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    pub entity_id: i64,
    pub entity_name: String,
    pub leader_name: Option<String>,
    pub period_id: i64,
    pub methodology_version_id: i64,
    pub summary: Option<RatingRow>, // 尚未聚合时为 None
    pub blocks: Vec<CriteriaBlock>,
}

/// 对比视图: 各分项的极差 (max − min)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSpread {
    pub score_public: f64,
    pub score_closed: f64,
    pub score_penalties: f64,
    pub score_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityComparison {
    pub rows: Vec<RatingRow>,
    pub spread: ScoreSpread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneReferenceRow {
    pub zone: Zone,
    pub label: String,
    pub status: String,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>, // 不含
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationInfo {
    pub classification: Option<Classification>,
    pub criteria_count: i64,
    pub max_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodologyInfo {
    pub methodology: MethodologyVersion,
    pub criteria_total: i64,
    pub by_classification: Vec<ClassificationInfo>,
    pub max_total: f64, // 公开 + 封闭 满分
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStat {
    pub period_id: i64,
    pub observations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStats {
    pub entities: i64,
    pub periods: i64,
    pub methodologies: i64,
    pub criteria: i64,
    pub observations: i64,
    pub summaries: i64,
    pub quality_flags: i64,
    pub observations_by_period: Vec<PeriodStat>,
}

/// CSV 导出行
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    rank: usize,
    entity_id: i64,
    entity_name: &'a str,
    leader_name: &'a str,
    score_public: f64,
    score_closed: f64,
    score_penalties: f64,
    score_total: f64,
    zone: &'static str,
}

// ==========================================
// 排名与排序
// ==========================================

/// 按 score_total 降序计算名次 (同分同名次: 1, 2, 2, 4)
fn ranked_rows(records: Vec<RatingRecord>) -> Vec<RatingRow> {
    let mut records = records;
    records.sort_by(|a, b| {
        b.score_total
            .partial_cmp(&a.score_total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity_name.cmp(&b.entity_name))
    });

    let mut rows = Vec::with_capacity(records.len());
    let mut previous: Option<(f64, usize)> = None;
    for (index, r) in records.into_iter().enumerate() {
        let rank = match previous {
            Some((score, rank)) if score == r.score_total => rank,
            _ => index + 1,
        };
        previous = Some((r.score_total, rank));
        rows.push(RatingRow {
            rank,
            entity_id: r.entity_id,
            entity_name: r.entity_name,
            leader_name: r.leader_name,
            period_id: r.period_id,
            methodology_version_id: r.methodology_version_id,
            score_public: r.score_public,
            score_closed: r.score_closed,
            score_penalties: r.score_penalties,
            score_total: r.score_total,
            zone: r.zone,
        });
    }
    rows
}

fn sort_rows(rows: &mut [RatingRow], sort_by: RatingSortField, order: SortOrder) {
    rows.sort_by(|a, b| {
        let primary = match sort_by {
            RatingSortField::ScoreTotal => a.score_total.partial_cmp(&b.score_total),
            RatingSortField::ScorePublic => a.score_public.partial_cmp(&b.score_public),
            RatingSortField::ScoreClosed => a.score_closed.partial_cmp(&b.score_closed),
            RatingSortField::EntityName => Some(a.entity_name.cmp(&b.entity_name)),
        }
        .unwrap_or(Ordering::Equal);
        let primary = match order {
            SortOrder::Asc => primary,
            SortOrder::Desc => primary.reverse(),
        };
        primary.then_with(|| a.entity_name.cmp(&b.entity_name))
    });
}

fn spread_of(rows: &[RatingRow], field: impl Fn(&RatingRow) -> f64) -> f64 {
    let values = rows.iter().map(field);
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if rows.is_empty() {
        0.0
    } else {
        max - min
    }
}

// ==========================================
// RatingApi - 读侧 API
// ==========================================
pub struct RatingApi {
    repos: Arc<RatingRepositories>,
    config: Arc<ConfigManager>,
}

impl RatingApi {
    pub fn new(repos: Arc<RatingRepositories>, config: Arc<ConfigManager>) -> Self {
        Self { repos, config }
    }

    fn ensure_methodology(&self, methodology_version_id: i64) -> ApiResult<MethodologyVersion> {
        self.repos
            .methodology_repo
            .find_by_id(methodology_version_id)?
            .ok_or(ApiError::MissingMethodology(methodology_version_id))
    }

    /// 完整排序后的评分表 (未分页)
    fn sorted_table(&self, query: &RatingQuery) -> ApiResult<Vec<RatingRow>> {
        self.ensure_methodology(query.methodology_version_id)?;
        let records = self
            .repos
            .aggregate_repo
            .list_rating_records(query.methodology_version_id, query.period_id)?;

        let mut rows: Vec<RatingRow> = ranked_rows(records)
            .into_iter()
            .filter(|row| query.zone.map_or(true, |zone| row.zone == zone))
            .collect();
        sort_rows(&mut rows, query.sort_by, query.order);
        Ok(rows)
    }

    /// 评分表 (排序 + 分页)
    ///
    /// # 校验
    /// - page >= 1
    /// - 1 <= page_size <= 500
    pub fn rating_table(&self, query: &RatingQuery) -> ApiResult<RatingPage> {
        let _perf = PerfGuard::new("rating_table");
        if query.page == 0 {
            return Err(ApiError::InvalidInput("page 必须 >= 1".to_string()));
        }
        if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
            return Err(ApiError::InvalidInput(format!(
                "page_size 必须在 1..={} 之间, 实际 {}",
                MAX_PAGE_SIZE, query.page_size
            )));
        }

        let rows = self.sorted_table(query)?;
        let total = rows.len();
        let total_pages = total.div_ceil(query.page_size);
        // 页号越界返回空页
        let offset = (query.page - 1).saturating_mul(query.page_size);
        let rows = rows
            .into_iter()
            .skip(offset)
            .take(query.page_size)
            .collect();

        Ok(RatingPage {
            rows,
            total,
            page: query.page,
            page_size: query.page_size,
            total_pages,
        })
    }

    /// 主体明细 (按板块分组的标准得分)
    ///
    /// # 规则
    /// - 板块按名称排序, 未归属板块排最后
    /// - 板块内按标准代码排序
    /// - 分值按观测解析规则取值, 无观测计 0
    ///
    /// # 返回
    /// - Err(NotFound): 主体或周期不存在
    /// - Err(MissingMethodology): 版本不存在
    pub fn entity_detail(
        &self,
        entity_id: i64,
        period_id: i64,
        methodology_version_id: i64,
    ) -> ApiResult<EntityDetail> {
        self.ensure_methodology(methodology_version_id)?;
        let entity = self
            .repos
            .entity_repo
            .find_by_id(entity_id)?
            .ok_or_else(|| ApiError::NotFound(format!("主体(id={})不存在", entity_id)))?;
        if self.repos.period_repo.find_by_id(period_id)?.is_none() {
            return Err(ApiError::NotFound(format!("周期(id={})不存在", period_id)));
        }

        let scores: HashMap<String, f64> = self
            .repos
            .observation_repo
            .fetch_observations(entity_id, period_id, methodology_version_id)?
            .into_iter()
            .map(|obs| {
                let (score, _) = obs.resolved_score();
                (obs.criterion_code, score)
            })
            .collect();

        let mut grouped: BTreeMap<Option<String>, Vec<CriterionScore>> = BTreeMap::new();
        for criterion in self
            .repos
            .criterion_repo
            .list_by_version(methodology_version_id)?
        {
            let observed = scores.get(&criterion.code).copied();
            let block = criterion
                .block
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string);
            grouped.entry(block).or_default().push(CriterionScore {
                code: criterion.code,
                name: criterion.name,
                classification: criterion.classification,
                score: observed.unwrap_or(0.0),
                observed: observed.is_some(),
            });
        }

        // BTreeMap 中 None 排在最前, 移到末尾
        let unassigned = grouped.remove(&None);
        let mut blocks: Vec<CriteriaBlock> = grouped
            .into_iter()
            .map(|(block, criteria)| CriteriaBlock {
                label: block.clone().unwrap_or_default(),
                score: criteria.iter().map(|c| c.score).sum(),
                block,
                criteria,
            })
            .collect();
        if let Some(criteria) = unassigned {
            blocks.push(CriteriaBlock {
                block: None,
                label: crate::i18n::t("rating.unassigned_block"),
                score: criteria.iter().map(|c| c.score).sum(),
                criteria,
            });
        }

        let summary = ranked_rows(
            self.repos
                .aggregate_repo
                .list_rating_records(methodology_version_id, period_id)?,
        )
        .into_iter()
        .find(|row| row.entity_id == entity_id);

        Ok(EntityDetail {
            entity_id,
            entity_name: entity.entity_name,
            leader_name: entity.leader_name,
            period_id,
            methodology_version_id,
            summary,
            blocks,
        })
    }

    /// 主体对比
    ///
    /// # 返回
    /// - Err(InvalidInput): 少于 2 个不同主体
    /// - Err(NotFound): 某主体在该周期/版本没有汇总
    pub fn compare_entities(
        &self,
        entity_ids: &[i64],
        period_id: i64,
        methodology_version_id: i64,
    ) -> ApiResult<EntityComparison> {
        let mut ids = entity_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() < 2 {
            return Err(ApiError::InvalidInput("对比至少需要 2 个不同主体".to_string()));
        }

        self.ensure_methodology(methodology_version_id)?;
        let all = ranked_rows(
            self.repos
                .aggregate_repo
                .list_rating_records(methodology_version_id, period_id)?,
        );

        let mut rows = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in &ids {
            match all.iter().find(|row| row.entity_id == *id) {
                Some(row) => rows.push(row.clone()),
                None => missing.push(id.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(ApiError::NotFound(format!(
                "主体 [{}] 在周期 {} / 版本 {} 下没有汇总",
                missing.join(", "),
                period_id,
                methodology_version_id
            )));
        }

        let spread = ScoreSpread {
            score_public: spread_of(&rows, |r| r.score_public),
            score_closed: spread_of(&rows, |r| r.score_closed),
            score_penalties: spread_of(&rows, |r| r.score_penalties),
            score_total: spread_of(&rows, |r| r.score_total),
        };
        Ok(EntityComparison { rows, spread })
    }

    /// 风险区间参考表
    pub async fn zone_reference(&self, methodology_version_id: i64) -> ApiResult<Vec<ZoneReferenceRow>> {
        self.ensure_methodology(methodology_version_id)?;
        let thresholds = self
            .config
            .get_zone_thresholds(methodology_version_id)
            .await
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        let classifier = ZoneClassifier::new();
        classifier.validate(&thresholds)?;

        Ok(classifier
            .bands(&thresholds)
            .into_iter()
            .map(|band| ZoneReferenceRow {
                zone: band.zone,
                label: band.zone.label(),
                status: band.zone.status(),
                min_score: band.min_score,
                max_score: band.max_score,
                color: band.zone.color_hex().to_string(),
            })
            .collect())
    }

    /// 方法论说明 (标准数量与各分类满分)
    pub fn methodology_info(&self, methodology_version_id: i64) -> ApiResult<MethodologyInfo> {
        let methodology = self.ensure_methodology(methodology_version_id)?;
        let summary = self
            .repos
            .criterion_repo
            .summarize_by_classification(methodology_version_id)?;

        let criteria_total = summary.iter().map(|s| s.criteria_count).sum();
        let max_total = summary
            .iter()
            .filter(|s| {
                matches!(
                    s.classification,
                    Some(Classification::Public) | Some(Classification::Closed)
                )
            })
            .map(|s| s.max_points)
            .sum();

        Ok(MethodologyInfo {
            methodology,
            criteria_total,
            by_classification: summary
                .into_iter()
                .map(|s| ClassificationInfo {
                    classification: s.classification,
                    criteria_count: s.criteria_count,
                    max_points: s.max_points,
                })
                .collect(),
            max_total,
        })
    }

    /// 全部方法论版本 (最新在前)
    pub fn list_methodologies(&self) -> ApiResult<Vec<MethodologyVersion>> {
        Ok(self.repos.methodology_repo.list_all()?)
    }

    /// 数据统计
    pub fn data_stats(&self) -> ApiResult<DataStats> {
        let _perf = PerfGuard::new("data_stats");
        let by_period: Vec<PeriodCount> = self.repos.observation_repo.count_by_period()?;
        Ok(DataStats {
            entities: self.repos.entity_repo.count_all()?,
            periods: self.repos.period_repo.count_all()?,
            methodologies: self.repos.methodology_repo.count_all()?,
            criteria: self.repos.criterion_repo.count_all()?,
            observations: self.repos.observation_repo.count_all()?,
            summaries: self.repos.aggregate_repo.count_all()?,
            quality_flags: self.repos.quality_repo.count_all()?,
            observations_by_period: by_period
                .into_iter()
                .map(|p| PeriodStat {
                    period_id: p.period_id,
                    observations: p.count,
                })
                .collect(),
        })
    }

    /// 导出评分表为 CSV (忽略分页, 导出全部行)
    ///
    /// # 返回
    /// - Ok(usize): 导出行数
    pub fn export_rating_csv<W: Write>(&self, query: &RatingQuery, writer: W) -> ApiResult<usize> {
        let rows = self.sorted_table(query)?;
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &rows {
            csv_writer
                .serialize(CsvRow {
                    rank: row.rank,
                    entity_id: row.entity_id,
                    entity_name: &row.entity_name,
                    leader_name: row.leader_name.as_deref().unwrap_or(""),
                    score_public: row.score_public,
                    score_closed: row.score_closed,
                    score_penalties: row.score_penalties,
                    score_total: row.score_total,
                    zone: row.zone.as_str(),
                })
                .map_err(|e| ApiError::InternalError(format!("CSV 写入失败: {}", e)))?;
        }
        csv_writer
            .flush()
            .map_err(|e| ApiError::InternalError(format!("CSV 写入失败: {}", e)))?;
        Ok(rows.len())
    }
}
