//! 订阅（Subscription）
//!
//! 由 `ReplayStream::subscribe` 创建，独占地消费自己的队列。
//! 丢弃订阅即退订；订阅只持有流的弱引用，不会延长流的生命周期。
//!
use std::sync::{Arc, Weak};

use super::Shared;
use super::slot::{Slot, SubscriptionId};
use crate::error::StreamResult;
use crate::event::Event;

/// 流的一个监听者
pub struct Subscription<T> {
    slot: Arc<Slot<T>>,
    stream: Weak<Shared<T>>,
}

impl<T> Subscription<T> {
    pub(super) fn new(slot: Arc<Slot<T>>, stream: Weak<Shared<T>>) -> Self {
        Self { slot, stream }
    }

    /// 已关闭流上的订阅：只产生关闭信号
    pub(super) fn closed() -> Self {
        Self {
            slot: Arc::new(Slot::sealed()),
            stream: Weak::new(),
        }
    }

    pub(super) fn slot(&self) -> &Arc<Slot<T>> {
        &self.slot
    }

    pub(super) fn stream(&self) -> &Weak<Shared<T>> {
        &self.stream
    }

    pub fn id(&self) -> SubscriptionId {
        self.slot.id()
    }

    /// 下一条尚未收到的事件序号
    pub fn cursor(&self) -> u64 {
        self.slot.cursor()
    }

    /// 已入队但尚未消费的事件数
    pub fn pending(&self) -> usize {
        self.slot.pending()
    }

    /// 是否已经只剩关闭信号
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    /// 取下一条事件
    ///
    /// 队列为空且流未关闭时挂起；流关闭且队列取空、或已退订时返回 `Closed`。
    /// 取消安全：丢弃返回的 future 不会丢失或重复任何事件。
    pub async fn next(&mut self) -> StreamResult<Event<T>> {
        loop {
            let ready = self.slot.data_notified();
            if let Some(event) = self.slot.pop()? {
                return Ok(event);
            }

            let _parked = self.slot.park();
            ready.await;
        }
    }

    /// 非阻塞地取下一条事件，队列为空时返回 `Ok(None)`
    pub fn try_next(&mut self) -> StreamResult<Option<Event<T>>> {
        self.slot.pop()
    }

    /// 转换为 futures Stream，遇到关闭信号时结束
    #[cfg(feature = "stream")]
    pub fn into_stream(self) -> futures_core::stream::BoxStream<'static, Event<T>>
    where
        T: Send + Sync + 'static,
    {
        Box::pin(futures_util::stream::unfold(self, |mut sub| async move {
            sub.next().await.ok().map(|event| (event, sub))
        }))
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.stream.upgrade() {
            shared.detach(&self.slot);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id())
            .field("cursor", &self.cursor())
            .field("pending", &self.pending())
            .finish()
    }
}
