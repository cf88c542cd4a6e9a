// ==========================================
// 市级治理效能评分系统 - 维度实体
// ==========================================
// 职责: 被评主体 (市/区) 与评估周期
// ==========================================

use crate::domain::types::PeriodType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// Entity - 被评主体 (市政单位)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: i64,
    pub entity_name: String,
    pub oktmo: Option<String>,       // 行政区划代码
    pub leader_name: Option<String>, // 负责人
}

// ==========================================
// Period - 评估周期
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub period_id: i64,
    pub period_type: PeriodType,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.date_from && date <= self.date_to
    }
}
