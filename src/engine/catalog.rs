// ==========================================
// 市级治理效能评分系统 - 标准目录视图
// ==========================================
// 职责: 单个方法论版本的标准目录快照 (聚合期间只读)
// 红线: 分类只在目录中决定一次, 聚合方不再按代码字符串重新推断
// ==========================================

use crate::domain::criterion::Criterion;
use crate::domain::types::Classification;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::CriterionRepository;
use std::collections::BTreeMap;

// ==========================================
// CriteriaCatalog - 标准目录
// ==========================================
#[derive(Debug, Clone)]
pub struct CriteriaCatalog {
    methodology_version_id: i64,
    by_code: BTreeMap<String, Criterion>,
}

impl CriteriaCatalog {
    /// 从已加载的标准构建 (忽略其他版本的条目)
    pub fn from_criteria(methodology_version_id: i64, criteria: Vec<Criterion>) -> Self {
        let by_code = criteria
            .into_iter()
            .filter(|c| c.methodology_version_id == methodology_version_id)
            .map(|c| (c.code.clone(), c))
            .collect();
        Self {
            methodology_version_id,
            by_code,
        }
    }

    /// 从仓储加载某版本的目录
    pub fn load(repo: &CriterionRepository, methodology_version_id: i64) -> EngineResult<Self> {
        let criteria = repo.list_by_version(methodology_version_id)?;
        Ok(Self::from_criteria(methodology_version_id, criteria))
    }

    pub fn methodology_version_id(&self) -> i64 {
        self.methodology_version_id
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// 查找标准
    ///
    /// # 返回
    /// - Err(UnknownCriterion): 代码未在该版本注册
    pub fn get(&self, code: &str) -> EngineResult<&Criterion> {
        self.by_code
            .get(code)
            .ok_or_else(|| EngineError::UnknownCriterion {
                methodology_version_id: self.methodology_version_id,
                code: code.to_string(),
            })
    }

    /// 标准分类
    ///
    /// # 返回
    /// - Err(UnknownCriterion): 未注册
    /// - Err(UnclassifiedCriterion): 已注册但分类为空
    pub fn classify(&self, code: &str) -> EngineResult<Classification> {
        self.get(code)?
            .classification
            .ok_or_else(|| EngineError::UnclassifiedCriterion {
                methodology_version_id: self.methodology_version_id,
                code: code.to_string(),
            })
    }

    /// 标准分值区间 (min, max)
    pub fn point_range_of(&self, code: &str) -> EngineResult<(f64, f64)> {
        Ok(self.get(code)?.point_range())
    }

    /// 全部标准 (按代码排序)
    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.by_code.values()
    }
}
