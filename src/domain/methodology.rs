// ==========================================
// 市级治理效能评分系统 - 方法论版本领域模型
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// MethodologyVersion - 方法论版本
// ==========================================
// 用途: 定义标准集合、分类与分值区间的版本化规则集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodologyVersion {
    pub version_id: i64,
    pub version: String,              // 版本名 (如 "2.0")
    pub valid_from: NaiveDate,        // 生效日期
    pub valid_to: Option<NaiveDate>,  // 失效日期 (None 表示仍有效)
    pub notes: Option<String>,
}

impl MethodologyVersion {
    /// 指定日期是否处于有效期
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_to.map_or(true, |to| date <= to)
    }
}
