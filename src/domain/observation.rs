// ==========================================
// 市级治理效能评分系统 - 原始观测领域模型
// ==========================================
// 职责: (主体, 周期, 标准, 方法论版本) 维度的原始记录
// 红线: 引擎从不删除观测; 只由导入方写入
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Observation - 原始观测
// ==========================================
// 主键: (entity_id, period_id, criterion_code, methodology_version_id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: i64,
    pub period_id: i64,
    pub criterion_code: String,
    pub methodology_version_id: i64,
    pub raw_value: Option<f64>, // 原始测量值 (可能尚未回填)
    pub score: Option<f64>,     // 换算后的分值 (聚合前必须解析)
}

// ==========================================
// ScoreResolution - 分值解析来源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreResolution {
    Recorded,     // 已有分值
    FromRaw,      // score 缺失, 回退为 raw_value
    DefaultZero,  // score 与 raw_value 均缺失, 显式记 0
}

impl Observation {
    /// 解析聚合使用的分值
    ///
    /// # 规则
    /// 1. score 存在: 直接使用
    /// 2. score 缺失, raw_value 存在: score = raw_value (恒等回退, 非单位换算)
    /// 3. 二者均缺失: 0 (显式零值, 不把 NULL 带入求和)
    pub fn resolved_score(&self) -> (f64, ScoreResolution) {
        match (self.score, self.raw_value) {
            (Some(score), _) => (score, ScoreResolution::Recorded),
            (None, Some(raw)) => (raw, ScoreResolution::FromRaw),
            (None, None) => (0.0, ScoreResolution::DefaultZero),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(raw_value: Option<f64>, score: Option<f64>) -> Observation {
        Observation {
            entity_id: 1,
            period_id: 1,
            criterion_code: "pub_1".to_string(),
            methodology_version_id: 1,
            raw_value,
            score,
        }
    }

    #[test]
    fn test_resolved_score_prefers_recorded() {
        assert_eq!(
            obs(Some(9.0), Some(2.5)).resolved_score(),
            (2.5, ScoreResolution::Recorded)
        );
    }

    #[test]
    fn test_resolved_score_falls_back_to_raw() {
        assert_eq!(
            obs(Some(4.0), None).resolved_score(),
            (4.0, ScoreResolution::FromRaw)
        );
    }

    #[test]
    fn test_resolved_score_defaults_to_zero() {
        assert_eq!(
            obs(None, None).resolved_score(),
            (0.0, ScoreResolution::DefaultZero)
        );
    }
}
