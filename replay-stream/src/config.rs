//! 流配置（StreamConfig）
//!
//! 一个参数化的原语同时覆盖两种语义：
//! - `replay_capacity = 1` 且丢弃最旧：状态语义（始终持有最新值，更新会被合并）；
//! - `replay_capacity = N`：事件日志语义（广播 + 回放最近 N 条）。
//!
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{StreamError, StreamResult};

/// 默认的每订阅者缓冲深度
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// 订阅者队列已满时的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 生产者挂起，直到队列腾出空间或流关闭
    #[default]
    Suspend,
    /// 淘汰该订阅者最旧的待消费事件
    DropOldest,
    /// 新事件不进入该订阅者队列
    DropLatest,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suspend => "suspend",
            Self::DropOldest => "drop_oldest",
            Self::DropLatest => "drop_latest",
        }
    }

    /// 该策略是否会在队列满时丢弃事件
    pub fn is_lossy(&self) -> bool {
        !matches!(self, Self::Suspend)
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "suspend" => Ok(Self::Suspend),
            "drop_oldest" => Ok(Self::DropOldest),
            "drop_latest" => Ok(Self::DropLatest),
            _ => Err(StreamError::invalid_configuration(format!(
                "unknown overflow policy: {s}"
            ))),
        }
    }
}

/// 流配置
#[derive(Builder, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 为新订阅者保留的最近事件数
    #[builder(default)]
    pub replay_capacity: usize,
    /// 每个订阅者尚未消费事件的队列深度
    #[builder(default = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    /// 队列满时的处理策略
    #[builder(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 0,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            overflow_policy: OverflowPolicy::Suspend,
        }
    }
}

impl StreamConfig {
    /// 状态语义：只保留最新值，慢消费者只会看到最近一次更新
    pub fn state() -> Self {
        Self {
            replay_capacity: 1,
            buffer_capacity: 1,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }

    /// 事件日志语义：回放最近 `replay` 条，队列满时挂起生产者
    pub fn events(replay: usize) -> Self {
        Self {
            replay_capacity: replay,
            buffer_capacity: replay.max(1),
            overflow_policy: OverflowPolicy::Suspend,
        }
    }

    /// 从 JSON 读取并校验配置；负数容量、未知策略等均视为配置错误
    pub fn from_json(raw: &str) -> StreamResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.overflow_policy.is_lossy() && self.queue_capacity() == 0 {
            return Err(StreamError::invalid_configuration(format!(
                "overflow policy {} requires replay_capacity > 0 or buffer_capacity > 0",
                self.overflow_policy
            )));
        }
        Ok(())
    }

    /// 每订阅者队列的实际容量，至少能容纳一次完整回放
    ///
    /// 因此不消费的订阅者在 DropOldest 下保留的是最近 `max(replay, buffer)` 条，
    /// 而不只是最近 `buffer` 条。
    pub fn queue_capacity(&self) -> usize {
        self.buffer_capacity.max(self.replay_capacity)
    }

    /// 容量为零的 Suspend 流：生产者与消费者逐条交接
    pub fn is_rendezvous(&self) -> bool {
        self.queue_capacity() == 0
    }
}
