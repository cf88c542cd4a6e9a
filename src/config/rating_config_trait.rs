// ==========================================
// 市级治理效能评分系统 - 评分配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::aggregate::ZoneThresholds;
use crate::domain::types::ClassificationPrefixes;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// RatingConfigReader Trait
// ==========================================
// 用途: 聚合驱动与一致性修复所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait RatingConfigReader: Send + Sync {
    // ===== 风险区间配置 =====

    /// 获取方法论版本的风险区间阈值
    ///
    /// # 查找顺序
    /// - methodology/{version_id} → global → 默认值
    ///
    /// # 默认值
    /// - green_min = 53, yellow_min = 29
    async fn get_zone_thresholds(
        &self,
        methodology_version_id: i64,
    ) -> Result<ZoneThresholds, Box<dyn Error>>;

    // ===== 标准分类配置 =====

    /// 获取标准代码前缀约定
    ///
    /// # 默认值
    /// - pub_ / closed_ / pen_
    async fn get_classification_prefixes(
        &self,
        methodology_version_id: i64,
    ) -> Result<ClassificationPrefixes, Box<dyn Error>>;

    // ===== 批量聚合配置 =====

    /// 获取聚合并发度
    ///
    /// # 默认值
    /// - 4
    async fn get_aggregation_parallelism(&self) -> Result<usize, Box<dyn Error>>;

    /// 是否整批单事务写入
    ///
    /// # 默认值
    /// - true
    async fn get_aggregation_transactional(&self) -> Result<bool, Box<dyn Error>>;
}
