//! 事件发送端（EventSink）
//!
//! 生产者侧的统一抽象，支持批量发出，便于在异步运行时中以 trait 对象传递。
//!
use async_trait::async_trait;

use crate::error::StreamResult;
use crate::event::Event;
use crate::stream::ReplayStream;

/// 事件发送端：负责把值发出到流中
#[async_trait]
pub trait EventSink<T: Send + Sync + 'static>: Send + Sync {
    async fn emit(&self, value: T) -> StreamResult<Event<T>>;

    /// 按顺序逐条发出，遇到第一个错误即停止
    async fn emit_all(&self, values: Vec<T>) -> StreamResult<Vec<Event<T>>> {
        let mut emitted = Vec::with_capacity(values.len());
        for value in values {
            emitted.push(self.emit(value).await?);
        }
        Ok(emitted)
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> EventSink<T> for ReplayStream<T> {
    async fn emit(&self, value: T) -> StreamResult<Event<T>> {
        ReplayStream::emit(self, value).await
    }
}
