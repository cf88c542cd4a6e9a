// ==========================================
// 市级治理效能评分系统 - 聚合结果领域模型
// ==========================================
// 职责: 每个 (主体, 周期, 方法论版本) 的汇总评分
// 红线: score_total = max(0, public + closed + penalties)
// 红线: zone 是 score_total 的纯函数
// 红线: 完全派生数据, 不允许人工修改
// ==========================================

use crate::domain::types::Zone;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// UnitKey - 聚合单元键
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub entity_id: i64,
    pub period_id: i64,
    pub methodology_version_id: i64,
}

impl UnitKey {
    pub fn new(entity_id: i64, period_id: i64, methodology_version_id: i64) -> Self {
        Self {
            entity_id,
            period_id,
            methodology_version_id,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity={} period={} version={}",
            self.entity_id, self.period_id, self.methodology_version_id
        )
    }
}

// ==========================================
// ZoneThresholds - 风险区间阈值 (按方法论版本配置)
// ==========================================
// 下界包含: total >= green_min → GREEN; total >= yellow_min → YELLOW; 其余 RED
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    pub green_min: f64,
    pub yellow_min: f64,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self {
            green_min: 53.0,
            yellow_min: 29.0,
        }
    }
}

impl ZoneThresholds {
    /// 阈值是否自洽 (有限且 yellow_min <= green_min)
    pub fn is_valid(&self) -> bool {
        self.green_min.is_finite() && self.yellow_min.is_finite() && self.yellow_min <= self.green_min
    }
}

// ==========================================
// ScoreBreakdown - 分项汇总 (纯计算结果)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub score_public: f64,
    pub score_closed: f64,
    pub score_penalties: f64, // <= 0
    pub score_total: f64,     // >= 0
    pub zone: Zone,
    pub observation_count: usize,
}

impl ScoreBreakdown {
    /// 保底前的原始合计
    pub fn pre_floor_total(&self) -> f64 {
        self.score_public + self.score_closed + self.score_penalties
    }
}

// ==========================================
// Aggregate - 汇总评分 (fact_summary 行)
// ==========================================
// 读侧契约: 扁平结构, 不暴露引擎内部类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub entity_id: i64,
    pub period_id: i64,
    pub methodology_version_id: i64,
    pub score_public: f64,
    pub score_closed: f64,
    pub score_penalties: f64,
    pub score_total: f64,
    pub zone: Zone,
    pub updated_at: Option<NaiveDateTime>, // 写入前为 None
}

impl Aggregate {
    pub fn from_breakdown(key: UnitKey, breakdown: &ScoreBreakdown) -> Self {
        Self {
            entity_id: key.entity_id,
            period_id: key.period_id,
            methodology_version_id: key.methodology_version_id,
            score_public: breakdown.score_public,
            score_closed: breakdown.score_closed,
            score_penalties: breakdown.score_penalties,
            score_total: breakdown.score_total,
            zone: breakdown.zone,
            updated_at: None,
        }
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.entity_id, self.period_id, self.methodology_version_id)
    }

    /// 评分数值是否一致 (忽略 updated_at)
    pub fn same_scores(&self, other: &Aggregate) -> bool {
        self.key() == other.key()
            && self.score_public == other.score_public
            && self.score_closed == other.score_closed
            && self.score_penalties == other.score_penalties
            && self.score_total == other.score_total
            && self.zone == other.zone
    }
}
