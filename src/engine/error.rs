// ==========================================
// 市级治理效能评分系统 - 引擎层错误类型
// ==========================================
// 分级:
// - 单元级 (配置错误 / 范围错误 / 单条写入被拒): 记入报告, 批次继续
// - 运行级 (连接 / 锁 / 事务失败): 立即中止并向上传播
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 配置错误 (单元级) =====
    #[error("未注册的评分标准: version={methodology_version_id}, code={code}")]
    UnknownCriterion {
        methodology_version_id: i64,
        code: String,
    },

    #[error("方法论版本不存在: version={0}")]
    MissingMethodology(i64),

    #[error("评分标准缺少分类且无法按代码推断: version={methodology_version_id}, code={code}")]
    UnclassifiedCriterion {
        methodology_version_id: i64,
        code: String,
    },

    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("聚合任务异常退出: {0}")]
    TaskFailed(String),

    // ===== 范围错误 (单元级) =====
    #[error("主体未注册: entity={0}")]
    UnknownEntity(i64),

    #[error("周期未注册: period={0}")]
    UnknownPeriod(i64),

    // ===== 存储错误 =====
    #[error("存储拒绝写入: {0}")]
    StoreRejected(RepositoryError),

    #[error("存储不可用: {0}")]
    StoreUnavailable(RepositoryError),
}

// 只有连接 / 锁 / 事务失败才升级为运行级错误
impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        if err.is_unavailable() {
            EngineError::StoreUnavailable(err)
        } else {
            EngineError::StoreRejected(err)
        }
    }
}

impl EngineError {
    /// 是否中止整个运行
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }

    /// 报告中使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnknownCriterion { .. } => "UNKNOWN_CRITERION",
            EngineError::MissingMethodology(_) => "MISSING_METHODOLOGY",
            EngineError::UnclassifiedCriterion { .. } => "UNCLASSIFIED_CRITERION",
            EngineError::InvalidConfig(_) => "INVALID_CONFIG",
            EngineError::TaskFailed(_) => "TASK_FAILED",
            EngineError::UnknownEntity(_) => "UNKNOWN_ENTITY",
            EngineError::UnknownPeriod(_) => "UNKNOWN_PERIOD",
            EngineError::StoreRejected(_) => "STORE_REJECTED",
            EngineError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_fatal() {
        assert!(EngineError::StoreUnavailable(RepositoryError::LockError("poisoned".into())).is_fatal());
        assert!(!EngineError::MissingMethodology(7).is_fatal());
        assert!(!EngineError::UnknownCriterion {
            methodology_version_id: 1,
            code: "pub_99".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_repository_error_classification() {
        let fk: EngineError = RepositoryError::ForeignKeyViolation("FOREIGN KEY".into()).into();
        assert_eq!(fk.kind(), "STORE_REJECTED");
        assert!(!fk.is_fatal());

        let tx: EngineError = RepositoryError::DatabaseTransactionError("commit".into()).into();
        assert_eq!(tx.kind(), "STORE_UNAVAILABLE");
        assert!(tx.is_fatal());

        let conn: EngineError = RepositoryError::DatabaseConnectionError("busy".into()).into();
        assert!(conn.is_fatal());
        assert!(!EngineError::UnknownEntity(99).is_fatal());
    }

    #[test]
    fn test_message_carries_reason() {
        let err = EngineError::UnclassifiedCriterion {
            methodology_version_id: 2,
            code: "misc_4".to_string(),
        };
        assert!(err.to_string().contains("misc_4"));
        assert_eq!(err.kind(), "UNCLASSIFIED_CRITERION");
    }
}
