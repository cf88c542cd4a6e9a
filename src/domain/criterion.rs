// ==========================================
// 市级治理效能评分系统 - 评分标准领域模型
// ==========================================
// 职责: 标准目录条目 (代码 / 分类 / 分值区间 / 方法论版本)
// 红线: 参与聚合的标准分类不可为空
// ==========================================

use crate::domain::types::Classification;
use serde::{Deserialize, Serialize};

// ==========================================
// Criterion - 评分标准
// ==========================================
// 主键: (methodology_version_id, code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub methodology_version_id: i64,             // 所属方法论版本
    pub code: String,                            // 标准代码 (pub_1 / closed_3 / pen_2)
    pub name: String,                            // 标准名称
    pub block: Option<String>,                   // 所属板块
    pub classification: Option<Classification>,  // 分类 (导入时可能缺失)
    pub point_min: f64,                          // 分值下限 (扣分项为负数)
    pub point_max: f64,                          // 分值上限 (扣分项为 0)
}

impl Criterion {
    /// 分值区间 (min, max)
    pub fn point_range(&self) -> (f64, f64) {
        (self.point_min, self.point_max)
    }

    /// 满分 (扣分项取最大扣分幅度)
    pub fn max_points(&self) -> f64 {
        match self.classification {
            Some(Classification::Penalty) => self.point_min.abs(),
            _ => self.point_max,
        }
    }

    /// 分值是否落在区间内 (含端点)
    pub fn contains(&self, score: f64) -> bool {
        score >= self.point_min && score <= self.point_max
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(classification: Option<Classification>, min: f64, max: f64) -> Criterion {
        Criterion {
            methodology_version_id: 1,
            code: "pen_1".to_string(),
            name: "Конфликты с региональной властью".to_string(),
            block: None,
            classification,
            point_min: min,
            point_max: max,
        }
    }

    #[test]
    fn test_penalty_max_points_is_magnitude() {
        let c = criterion(Some(Classification::Penalty), -5.0, 0.0);
        assert_eq!(c.max_points(), 5.0);
        assert!(c.contains(-3.0));
        assert!(!c.contains(1.0));
    }

    #[test]
    fn test_public_range() {
        let c = criterion(Some(Classification::Public), 0.0, 3.0);
        assert_eq!(c.point_range(), (0.0, 3.0));
        assert_eq!(c.max_points(), 3.0);
        assert!(c.contains(3.0));
        assert!(!c.contains(3.5));
    }
}
