// ==========================================
// 市级治理效能评分系统 - 数据质量标记
// ==========================================
// 职责: 记录一致性修复中的静默纠正, 供运维审计
// 红线: 数据异常从不致命, 但必须计数并留痕
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// FlagType - 异常类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    MissingClassification,    // 分类缺失, 已按代码前缀补齐
    UnresolvedClassification, // 分类缺失且无法推断
    ScoreFromRaw,             // score 缺失, 回退为 raw_value
    ScoreDefaulted,           // score 与 raw_value 均缺失, 记 0
    OutOfRange,               // 分值超出标准区间
    PenaltySign,              // 扣分项分值为正
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::MissingClassification => "missing_classification",
            FlagType::UnresolvedClassification => "unresolved_classification",
            FlagType::ScoreFromRaw => "score_from_raw",
            FlagType::ScoreDefaulted => "score_defaulted",
            FlagType::OutOfRange => "out_of_range",
            FlagType::PenaltySign => "penalty_sign",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "missing_classification" => Some(FlagType::MissingClassification),
            "unresolved_classification" => Some(FlagType::UnresolvedClassification),
            "score_from_raw" => Some(FlagType::ScoreFromRaw),
            "score_defaulted" => Some(FlagType::ScoreDefaulted),
            "out_of_range" => Some(FlagType::OutOfRange),
            "penalty_sign" => Some(FlagType::PenaltySign),
            _ => None,
        }
    }

    /// 默认严重度
    pub fn severity(&self) -> FlagSeverity {
        match self {
            FlagType::MissingClassification | FlagType::ScoreFromRaw => FlagSeverity::Info,
            FlagType::ScoreDefaulted | FlagType::OutOfRange => FlagSeverity::Warning,
            FlagType::UnresolvedClassification | FlagType::PenaltySign => FlagSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagSeverity {
    Info,
    Warning,
    Error,
}

impl FlagSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagSeverity::Info => "info",
            FlagSeverity::Warning => "warning",
            FlagSeverity::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "info" => FlagSeverity::Info,
            "warning" => FlagSeverity::Warning,
            _ => FlagSeverity::Error,
        }
    }
}

// ==========================================
// DataQualityFlag - 数据质量标记
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityFlag {
    pub flag_id: Option<i64>,        // 写入前为 None
    pub run_id: Option<String>,      // 关联聚合运行
    pub methodology_version_id: i64,
    pub entity_id: Option<i64>,
    pub period_id: Option<i64>,
    pub criterion_code: Option<String>,
    pub flag_type: FlagType,
    pub severity: FlagSeverity,
    pub message: String,
    pub created_at: NaiveDateTime,
}

impl DataQualityFlag {
    /// 标准级异常 (无主体/周期)
    pub fn for_criterion(
        run_id: Option<&str>,
        methodology_version_id: i64,
        criterion_code: &str,
        flag_type: FlagType,
        message: String,
    ) -> Self {
        Self {
            flag_id: None,
            run_id: run_id.map(str::to_string),
            methodology_version_id,
            entity_id: None,
            period_id: None,
            criterion_code: Some(criterion_code.to_string()),
            flag_type,
            severity: flag_type.severity(),
            message,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// 观测级异常
    pub fn for_observation(
        run_id: Option<&str>,
        methodology_version_id: i64,
        entity_id: i64,
        period_id: i64,
        criterion_code: &str,
        flag_type: FlagType,
        message: String,
    ) -> Self {
        Self {
            entity_id: Some(entity_id),
            period_id: Some(period_id),
            ..Self::for_criterion(run_id, methodology_version_id, criterion_code, flag_type, message)
        }
    }
}
