//! 订阅槽（Slot）
//!
//! 每个订阅者一把独立的锁，保护它的待消费队列与游标。
//! 流级别的锁只负责历史与订阅者集合；加锁顺序固定为"先流后槽"。
//!
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::config::OverflowPolicy;
use crate::error::{StreamError, StreamResult};
use crate::event::Event;

/// 订阅标识，在单个流内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    /// 已关闭流返回的订阅使用的占位标识
    pub(crate) const DETACHED: Self = Self(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// 向槽投递一个事件的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Accepted,
    /// 淘汰了该序号的旧事件后接收
    DroppedOldest(Option<u64>),
    DroppedLatest,
    /// Suspend 策略下队列已满
    Full,
    /// 订阅已退订，跳过
    Detached,
    /// 流已关闭，不再接收
    Sealed,
}

pub(crate) struct SlotState<T> {
    queue: VecDeque<Event<T>>,
    capacity: usize,
    cursor: u64,
    // 正在 next() 中等待的消费者数；零容量交接依赖它
    parked: usize,
    sealed: bool,
    detached: bool,
}

impl<T> SlotState<T> {
    pub(crate) fn has_room(&self) -> bool {
        if self.capacity == 0 {
            self.queue.is_empty() && self.parked > 0
        } else {
            self.queue.len() < self.capacity
        }
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    pub(crate) fn push(&mut self, event: Event<T>) {
        self.queue.push_back(event);
    }
}

pub(crate) struct Slot<T> {
    id: SubscriptionId,
    state: Mutex<SlotState<T>>,
    data_ready: Notify,
    space_ready: Notify,
}

impl<T> Slot<T> {
    /// 创建槽并预先放入回放事件（旧的在前）
    pub(crate) fn new(
        id: SubscriptionId,
        capacity: usize,
        replay: impl IntoIterator<Item = Event<T>>,
        next_seq: u64,
    ) -> Self {
        let queue: VecDeque<Event<T>> = replay.into_iter().collect();
        let cursor = queue.front().map(Event::seq).unwrap_or(next_seq);

        Self {
            id,
            state: Mutex::new(SlotState {
                queue,
                capacity,
                cursor,
                parked: 0,
                sealed: false,
                detached: false,
            }),
            data_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    /// 已关闭的空槽：只会产生关闭信号
    pub(crate) fn sealed() -> Self {
        let slot = Self::new(SubscriptionId::DETACHED, 0, std::iter::empty(), 0);
        slot.lock().sealed = true;
        slot
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 非阻塞投递；Suspend 策略下队列满时返回 `Offer::Full`
    pub(crate) fn offer(&self, event: &Event<T>, policy: OverflowPolicy) -> Offer {
        let mut st = self.lock();
        if st.detached {
            return Offer::Detached;
        }
        if st.sealed {
            return Offer::Sealed;
        }

        let offer = if st.has_room() {
            st.push(event.clone());
            Offer::Accepted
        } else {
            match policy {
                OverflowPolicy::Suspend => return Offer::Full,
                OverflowPolicy::DropLatest => return Offer::DroppedLatest,
                OverflowPolicy::DropOldest => {
                    let evicted = st.queue.pop_front().map(|e| e.seq());
                    // 被淘汰的事件不会再送达，游标跳到仍保留的最旧事件
                    st.cursor = st.queue.front().map(Event::seq).unwrap_or(event.seq());
                    st.push(event.clone());
                    Offer::DroppedOldest(evicted)
                }
            }
        };
        drop(st);

        self.data_ready.notify_one();
        offer
    }

    /// 取出最旧的事件；队列为空且已关闭/退订时返回 `Closed`
    pub(crate) fn pop(&self) -> StreamResult<Option<Event<T>>> {
        let mut st = self.lock();
        if let Some(event) = st.queue.pop_front() {
            st.cursor = st.queue.front().map_or(event.seq() + 1, Event::seq);
            drop(st);
            self.space_ready.notify_one();
            return Ok(Some(event));
        }

        if st.detached || st.sealed {
            Err(StreamError::Closed)
        } else {
            Ok(None)
        }
    }

    /// 登记一个等待中的消费者，守卫释放时自动注销
    pub(crate) fn park(&self) -> Parked<'_, T> {
        let rendezvous = {
            let mut st = self.lock();
            st.parked += 1;
            st.capacity == 0
        };
        if rendezvous {
            self.space_ready.notify_one();
        }
        Parked { slot: self }
    }

    /// 流关闭：不再接收新事件，已排队的仍可取完
    pub(crate) fn seal(&self) {
        self.lock().sealed = true;
        self.wake_all();
    }

    /// 退订：立即释放队列
    pub(crate) fn detach(&self) {
        {
            let mut st = self.lock();
            st.detached = true;
            st.queue.clear();
        }
        self.wake_all();
    }

    pub(crate) fn notify_data(&self) {
        self.data_ready.notify_one();
    }

    pub(crate) fn data_notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.data_ready.notified()
    }

    pub(crate) fn space_notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.space_ready.notified()
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.lock().cursor
    }

    pub(crate) fn is_closed(&self) -> bool {
        let st = self.lock();
        st.detached || (st.sealed && st.queue.is_empty())
    }

    fn wake_all(&self) {
        self.data_ready.notify_one();
        self.space_ready.notify_one();
    }
}

pub(crate) struct Parked<'a, T> {
    slot: &'a Slot<T>,
}

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        let mut st = self.slot.lock();
        st.parked = st.parked.saturating_sub(1);
    }
}
