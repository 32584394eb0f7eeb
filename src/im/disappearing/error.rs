//! 阅后即焚配置的领域错误

use thiserror::Error;

/// 配置构造、复制与冲突判定过程中产生的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// 时长超过上限（本地校验错误，不做截断）
    #[error("invalid duration: {duration_seconds}s exceeds maximum {max}s")]
    InvalidDuration { duration_seconds: u32, max: u32 },

    /// 收到的更新比本地状态旧，直接丢弃
    #[error("stale timer version: current={current}, incoming={incoming}")]
    StaleVersion { current: u32, incoming: u32 },

    /// 同一版本的重复投递，视为幂等空操作
    #[error("duplicate timer version: {version}")]
    DuplicateVersion { version: u32 },

    /// 会话 ID 为空
    #[error("conversation id is required")]
    MissingConversationId,

    /// 更新属于另一个会话
    #[error("conversation mismatch: expected {expected}, got {actual}")]
    ConversationMismatch { expected: String, actual: String },
}

impl ConfigError {
    /// 调用方可以安全忽略的错误（旧版本或重复版本）
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            ConfigError::StaleVersion { .. } | ConfigError::DuplicateVersion { .. }
        )
    }
}
