// ==========================================
// 市级治理效能评分系统 - 领域类型定义
// ==========================================
// 依据: 评分方法论 - 公开/封闭/扣分 三类标准
// 依据: 风险区间 GREEN / YELLOW / RED
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 标准分类 (Classification)
// ==========================================
// 红线: 一个标准只属于一个分类; 参与聚合时分类不可为空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Public,  // 公开评分
    Closed,  // 封闭评分
    Penalty, // 扣分项 (分值存储为非正数)
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl Classification {
    pub const ALL: [Classification; 3] = [
        Classification::Public,
        Classification::Closed,
        Classification::Penalty,
    ];

    /// 从数据库字符串解析 (未知值返回 None, 由修复流程处理)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PUBLIC" => Some(Classification::Public),
            "CLOSED" => Some(Classification::Closed),
            "PENALTY" => Some(Classification::Penalty),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            Classification::Public => "PUBLIC",
            Classification::Closed => "CLOSED",
            Classification::Penalty => "PENALTY",
        }
    }

    /// 按标准代码前缀推断分类
    ///
    /// # 参数
    /// - `code`: 标准代码 (如 pub_1 / closed_3 / pen_2)
    /// - `prefixes`: 当前方法论配置的前缀约定
    ///
    /// # 返回
    /// - Some(Classification): 前缀命中
    /// - None: 无法推断
    pub fn infer_from_code(code: &str, prefixes: &ClassificationPrefixes) -> Option<Self> {
        let code = code.trim().to_lowercase();
        // 先匹配最长前缀, 避免 "pub" 与 "public_" 之类的前缀互相吞并
        let mut candidates = [
            (prefixes.public.to_lowercase(), Classification::Public),
            (prefixes.closed.to_lowercase(), Classification::Closed),
            (prefixes.penalty.to_lowercase(), Classification::Penalty),
        ];
        candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        candidates
            .into_iter()
            .find(|(prefix, _)| !prefix.is_empty() && code.starts_with(prefix.as_str()))
            .map(|(_, classification)| classification)
    }
}

// ==========================================
// 分类前缀约定 (Classification Prefixes)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPrefixes {
    pub public: String,
    pub closed: String,
    pub penalty: String,
}

impl Default for ClassificationPrefixes {
    fn default() -> Self {
        Self {
            public: "pub_".to_string(),
            closed: "closed_".to_string(),
            penalty: "pen_".to_string(),
        }
    }
}

// ==========================================
// 风险区间 (Zone)
// ==========================================
// 顺序: Red < Yellow < Green (稳定性由低到高)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    Red,    // 低稳定性
    Yellow, // 有条件稳定
    Green,  // 高稳定性
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Green, Zone::Yellow, Zone::Red];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Green => "GREEN",
            Zone::Yellow => "YELLOW",
            Zone::Red => "RED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "GREEN" => Some(Zone::Green),
            "YELLOW" => Some(Zone::Yellow),
            "RED" => Some(Zone::Red),
            _ => None,
        }
    }

    /// 地图着色
    pub fn color_hex(&self) -> &'static str {
        match self {
            Zone::Green => "#2E7D32",
            Zone::Yellow => "#F9A825",
            Zone::Red => "#C62828",
        }
    }

    /// 本地化名称 (ru: Зелёная / en: Green)
    pub fn label(&self) -> String {
        crate::i18n::t(&format!("zone.{}.label", self.as_str().to_lowercase()))
    }

    /// 本地化稳定性描述
    pub fn status(&self) -> String {
        crate::i18n::t(&format!("zone.{}.status", self.as_str().to_lowercase()))
    }
}

// ==========================================
// 周期类型 (Period Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Month,
    HalfYear,
    Year,
}

impl PeriodType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" => Some(PeriodType::Month),
            "halfyear" => Some(PeriodType::HalfYear),
            "year" => Some(PeriodType::Year),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PeriodType::Month => "month",
            PeriodType::HalfYear => "halfyear",
            PeriodType::Year => "year",
        }
    }
}

// ==========================================
// 聚合触发类型 (Aggregation Trigger)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregationTrigger {
    ImportCompleted,    // 导入完成
    MethodologyChanged, // 方法论变更
    Manual,             // 人工重算
    Scheduled,          // 定时任务
}

impl AggregationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationTrigger::ImportCompleted => "IMPORT_COMPLETED",
            AggregationTrigger::MethodologyChanged => "METHODOLOGY_CHANGED",
            AggregationTrigger::Manual => "MANUAL",
            AggregationTrigger::Scheduled => "SCHEDULED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "IMPORT_COMPLETED" | "IMPORT" => Some(AggregationTrigger::ImportCompleted),
            "METHODOLOGY_CHANGED" | "METHODOLOGY" => Some(AggregationTrigger::MethodologyChanged),
            "MANUAL" => Some(AggregationTrigger::Manual),
            "SCHEDULED" => Some(AggregationTrigger::Scheduled),
            _ => None,
        }
    }
}

// ==========================================
// 聚合运行状态 (Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,           // 全部成功
    CompletedWithErrors, // 部分单元失败
    Cancelled,           // 中途取消
    Failed,              // 存储不可用等致命错误
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "RUNNING" => RunStatus::Running,
            "COMPLETED" => RunStatus::Completed,
            "COMPLETED_WITH_ERRORS" => RunStatus::CompletedWithErrors,
            "CANCELLED" => RunStatus::Cancelled,
            _ => RunStatus::Failed,
        }
    }
}
