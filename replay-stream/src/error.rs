//! 流统一错误定义
//!
//! 只包含两类可观察失败：流已关闭、配置非法。
//! 丢弃策略下的丢弃与 Suspend 背压均不是错误。
//!
use std::fmt;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// 在 `close()` 之后调用 emit/next，或挂起中的 emit 遇到关闭
    #[error("stream closed")]
    Closed,

    /// 创建流时发现的配置问题，在任何事件流动之前失败
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl StreamError {
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_configuration(err.to_string())
    }
}

/// 统一 Result 类型别名
pub type StreamResult<T> = Result<T, StreamError>;

/// `try_emit` 的失败结果，总是把未发出的值交还给调用方
#[derive(Debug, PartialEq, Eq)]
pub enum TryEmitError<T> {
    Closed(T),
    WouldSuspend(T),
}

impl<T> TryEmitError<T> {
    /// 取回未发出的值
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::WouldSuspend(value) => value,
        }
    }
}

impl<T> fmt::Display for TryEmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("stream closed"),
            Self::WouldSuspend(_) => f.write_str("emit would suspend"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryEmitError<T> {}
