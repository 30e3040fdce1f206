//! 领域错误定义
//!
//! 定义聊天操作可能产生的所有错误类型，带有稳定的类别标识，
//! 供传输层一次性转换为对外的错误负载。

use thiserror::Error;

/// 聊天领域错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// 输入校验失败
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// 资源不存在
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    /// 乐观并发冲突（重试耗尽后仍然冲突）
    #[error("concurrent update conflict: {message}")]
    Concurrency { message: String },

    /// 安全策略拒绝
    #[error("operation denied: {message}")]
    Authorization { message: String },

    /// 协议错误（帧格式、未知方法等）
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// 连接错误（超时、锁获取失败、底层传输故障）
    #[error("connection error: {message}")]
    Connection { message: String },
}

/// 领域结果类型
pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// 稳定的错误类别标识，跨版本不变
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Concurrency { .. } => "concurrency",
            Self::Authorization { .. } => "authorization",
            Self::Protocol { .. } => "protocol",
            Self::Connection { .. } => "connection",
        }
    }
}
