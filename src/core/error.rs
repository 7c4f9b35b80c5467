//! 错误类型与上层映射
//!
//! 只有会话相关错误会真正返回给调用方；结构化输出解析失败在 Agent 层被兜底吸收，
//! 后端失败在 GenerationService 内降级。配置错误只在显式要求严格加载时返回。ErrorKind 供 HTTP 等上层映射状态码。

use thiserror::Error;

/// 编排层错误
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// 会话已评分结束，不再接受新的回合
    #[error("Session already ended: {0}")]
    SessionEnded(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// 上层可见的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Internal,
}

impl CoachError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoachError::SessionNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<config::ConfigError> for CoachError {
    fn from(err: config::ConfigError) -> Self {
        CoachError::ConfigError(err.to_string())
    }
}

/// 编排层 Result
pub type Result<T> = std::result::Result<T, CoachError>;
