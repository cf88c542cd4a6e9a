// ==========================================
// 市级治理效能评分系统 - 风险区间分类器
// ==========================================
// 职责: score_total → GREEN / YELLOW / RED
// 红线: 纯函数, 全定义域 (含 NaN / 负数), 下界包含
// ==========================================

use crate::domain::aggregate::ZoneThresholds;
use crate::domain::types::Zone;
use crate::engine::error::{EngineError, EngineResult};

/// 区间说明 (供读侧参考表使用)
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneBand {
    pub zone: Zone,
    pub min_score: Option<f64>, // None = 无下界
    pub max_score: Option<f64>, // 不含; None = 无上界
}

// ==========================================
// ZoneClassifier - 风险区间分类器
// ==========================================
pub struct ZoneClassifier {
    // 无状态
}

impl Default for ZoneClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneClassifier {
    pub fn new() -> Self {
        Self {}
    }

    /// 校验阈值配置
    ///
    /// # 返回
    /// - Err(InvalidConfig): 阈值非有限数或 yellow_min > green_min
    pub fn validate(&self, thresholds: &ZoneThresholds) -> EngineResult<()> {
        if thresholds.is_valid() {
            Ok(())
        } else {
            Err(EngineError::InvalidConfig(format!(
                "风险区间阈值不一致: green_min={}, yellow_min={}",
                thresholds.green_min, thresholds.yellow_min
            )))
        }
    }

    /// 按总分分类
    ///
    /// # 规则
    /// - total >= green_min → GREEN
    /// - yellow_min <= total < green_min → YELLOW
    /// - 其余 (含 NaN) → RED
    pub fn classify(&self, score_total: f64, thresholds: &ZoneThresholds) -> Zone {
        if score_total >= thresholds.green_min {
            Zone::Green
        } else if score_total >= thresholds.yellow_min {
            Zone::Yellow
        } else {
            Zone::Red
        }
    }

    /// 区间划分 (GREEN → RED)
    pub fn bands(&self, thresholds: &ZoneThresholds) -> Vec<ZoneBand> {
        vec![
            ZoneBand {
                zone: Zone::Green,
                min_score: Some(thresholds.green_min),
                max_score: None,
            },
            ZoneBand {
                zone: Zone::Yellow,
                min_score: Some(thresholds.yellow_min),
                max_score: Some(thresholds.green_min),
            },
            ZoneBand {
                zone: Zone::Red,
                min_score: None,
                max_score: Some(thresholds.yellow_min),
            },
        ]
    }
}
