//! 广播回放流（replay-stream）
//!
//! 提供一个显式构造、按引用传递的进程内事件分发原语：
//! - `ReplayStream`：发出事件、管理订阅者、回放历史、关闭；
//! - `Subscription`：独立游标与队列，挂起式的 `next()`；
//! - `StreamConfig` / `OverflowPolicy`：回放容量、缓冲容量与溢出策略；
//! - `EventSink`：生产者侧的异步抽象。
//!
//! 状态语义（始终持有最新值）与事件语义（广播 + 回放 N 条）是同一个原语的两种配置，
//! 见 `StreamConfig::state` 与 `StreamConfig::events`。
//!
//! 典型用法：
//! 1. 用 `StreamConfig` 描述容量与策略，`ReplayStream::new` 创建流；
//! 2. 消费者调用 `subscribe()` 并循环 `next().await`，直到收到 `StreamError::Closed`；
//! 3. 生产者调用 `emit(value).await`，需要超时时在外层包一层 `tokio::time::timeout`；
//! 4. 结束时调用 `close()`，所有等待中的调用统一结束。
//!
pub mod config;
pub mod error;
pub mod event;
pub mod sink;
pub mod stream;

pub use config::{OverflowPolicy, StreamConfig};
pub use error::{StreamError, StreamResult, TryEmitError};
pub use event::Event;
pub use sink::EventSink;
pub use stream::{ReplayStream, Subscription, SubscriptionId};
