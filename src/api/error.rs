// ==========================================
// 市级治理效能评分系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换 Repository / Engine 错误为用户友好的错误消息
// 红线: 所有错误信息必须包含显式原因
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 导入边界错误
    // ==========================================
    #[error("未注册的评分标准: version={methodology_version_id}, code={code}")]
    UnknownCriterion {
        methodology_version_id: i64,
        code: String,
    },

    #[error("方法论版本不存在: version={0}")]
    MissingMethodology(i64),

    #[error("分值越界: code={code}, score={score}, 区间=[{point_min}, {point_max}]")]
    ScoreOutOfRange {
        code: String,
        score: f64,
        point_min: f64,
        point_max: f64,
    },

    #[error("扣分项分值必须 <= 0: code={code}, score={score}")]
    PenaltySignViolation { code: String, score: f64 },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownCriterion {
                methodology_version_id,
                code,
            } => ApiError::UnknownCriterion {
                methodology_version_id,
                code,
            },
            EngineError::MissingMethodology(id) => ApiError::MissingMethodology(id),
            EngineError::UnclassifiedCriterion { .. } | EngineError::InvalidConfig(_) => {
                ApiError::ConfigError(err.to_string())
            }
            EngineError::TaskFailed(msg) => ApiError::InternalError(msg),
            EngineError::UnknownEntity(id) => ApiError::NotFound(format!("主体(id={})不存在", id)),
            EngineError::UnknownPeriod(id) => ApiError::NotFound(format!("周期(id={})不存在", id)),
            EngineError::StoreRejected(repo_err) | EngineError::StoreUnavailable(repo_err) => {
                repo_err.into()
            }
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
