//! 广播回放流（ReplayStream）
//!
//! 一个显式构造的事件分发原语：
//! - 任意数量的订阅者可随时加入/退出，各自拥有独立的游标与队列；
//! - 新订阅者先收到最近 `replay_capacity` 条历史事件（旧的在前）；
//! - 生产者快于消费者时按 `OverflowPolicy` 处理：挂起、淘汰最旧或丢弃最新。
//!
//! 历史与订阅者集合只在流锁内修改，每个订阅队列只在自身的槽锁内修改。
//! 丢弃策略下整个发送过程在流锁内完成；Suspend 策略下发送方先经过
//! 一个异步闸门串行化，以保证所有订阅者看到相同的事件顺序。
//!
mod slot;
mod subscription;

pub use slot::SubscriptionId;
pub use subscription::Subscription;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use self::slot::{Offer, Slot};
use crate::config::{OverflowPolicy, StreamConfig};
use crate::error::{StreamError, StreamResult, TryEmitError};
use crate::event::Event;

/// 广播回放流的句柄，克隆开销很小，所有克隆共享同一个流
pub struct ReplayStream<T> {
    inner: Arc<Shared<T>>,
}

impl<T> Clone for ReplayStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ReplayStream<T> {
    /// 创建流；配置非法时在任何事件流动之前失败
    pub fn new(config: StreamConfig) -> StreamResult<Self> {
        config.validate()?;
        debug!(
            replay_capacity = config.replay_capacity,
            buffer_capacity = config.buffer_capacity,
            overflow_policy = %config.overflow_policy,
            rendezvous = config.is_rendezvous(),
            "stream created"
        );

        Ok(Self {
            inner: Arc::new(Shared {
                config,
                state: Mutex::new(StreamState {
                    next_seq: 1,
                    next_id: 1,
                    history: VecDeque::with_capacity(config.replay_capacity),
                    subscribers: HashMap::new(),
                    closed: false,
                }),
                emit_gate: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// 发出一个事件
    ///
    /// Suspend 策略下，只要有订阅者队列已满就挂起，直到它腾出空间、退订或流关闭。
    /// 挂起期间被取消时，事件已写入历史，已送达的订阅者保留它，其余订阅者不会再收到。
    pub async fn emit(&self, value: T) -> StreamResult<Event<T>> {
        let shared = &self.inner;
        if shared.config.overflow_policy.is_lossy() {
            return shared.emit_lossy(value).map_err(|_| StreamError::Closed);
        }

        let _gate = shared.emit_gate.lock().await;
        let (event, targets) = shared.record(value)?;
        for slot in &targets {
            shared.deliver(slot, &event).await?;
        }
        Ok(event)
    }

    /// 非阻塞发出；Suspend 策略下若需要挂起则不发出并交还值
    pub fn try_emit(&self, value: T) -> Result<Event<T>, TryEmitError<T>> {
        let shared = &self.inner;
        if shared.config.overflow_policy.is_lossy() {
            return shared.emit_lossy(value);
        }

        let Ok(_gate) = shared.emit_gate.try_lock() else {
            return Err(TryEmitError::WouldSuspend(value));
        };
        let mut state = shared.lock_state();
        if state.closed {
            return Err(TryEmitError::Closed(value));
        }

        // 先锁住全部槽确认都有空间，再统一写入，避免部分送达
        let targets: Vec<Arc<Slot<T>>> = state.subscribers.values().cloned().collect();
        let mut guards = Vec::with_capacity(targets.len());
        for slot in &targets {
            let guard = slot.lock();
            if !guard.is_detached() && !guard.has_room() {
                return Err(TryEmitError::WouldSuspend(value));
            }
            guards.push(guard);
        }

        let event = state.append(value, shared.config.replay_capacity);
        for guard in guards.iter_mut().filter(|g| !g.is_detached()) {
            guard.push(event.clone());
        }
        drop(guards);
        drop(state);

        for slot in &targets {
            slot.notify_data();
        }
        trace!(seq = event.seq(), subscribers = targets.len(), "event emitted");
        Ok(event)
    }

    /// 订阅；已关闭的流返回只会产生关闭信号的订阅
    pub fn subscribe(&self) -> Subscription<T> {
        let shared = &self.inner;
        let mut state = shared.lock_state();
        if state.closed {
            debug!("subscribe on closed stream");
            return Subscription::closed();
        }

        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        let slot = Arc::new(Slot::new(
            id,
            shared.config.queue_capacity(),
            state.history.iter().cloned(),
            state.next_seq,
        ));
        state.subscribers.insert(id, Arc::clone(&slot));
        debug!(
            subscription = %id,
            replayed = state.history.len(),
            subscribers = state.subscribers.len(),
            "subscribed"
        );

        Subscription::new(slot, Arc::downgrade(shared))
    }

    /// 退订并释放其队列；幂等
    pub fn unsubscribe(&self, subscription: &Subscription<T>) {
        if !std::ptr::eq(subscription.stream().as_ptr(), Arc::as_ptr(&self.inner)) {
            warn!(subscription = %subscription.id(), "unsubscribe from a foreign stream ignored");
            return;
        }
        self.inner.detach(subscription.slot());
    }

    /// 关闭流；幂等
    ///
    /// 之后的 emit 返回 `Closed`，挂起的 emit 以 `Closed` 结束，
    /// 订阅者取完已排队的事件后收到 `Closed`。
    pub fn close(&self) {
        self.inner.close();
    }

    /// 等待流关闭
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock_state().closed
    }

    /// 当前回放缓存的快照（旧的在前）
    pub fn replay_cache(&self) -> Vec<Event<T>> {
        self.inner.lock_state().history.iter().cloned().collect()
    }

    /// 清空回放缓存，不影响已入队的事件
    pub fn reset_replay_cache(&self) {
        let mut state = self.inner.lock_state();
        let cleared = state.history.len();
        state.history.clear();
        debug!(cleared, "replay cache reset");
    }

    /// 最近一条历史事件，状态语义下即当前值
    pub fn latest(&self) -> Option<Event<T>> {
        self.inner.lock_state().history.back().cloned()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers.len()
    }

    /// 最后分配的序号，尚未发出过事件时为 0
    pub fn last_seq(&self) -> u64 {
        self.inner.lock_state().next_seq - 1
    }
}

impl<T> std::fmt::Debug for ReplayStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("ReplayStream")
            .field("config", &self.inner.config)
            .field("last_seq", &(state.next_seq - 1))
            .field("history", &state.history.len())
            .field("subscribers", &state.subscribers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

pub(crate) struct Shared<T> {
    config: StreamConfig,
    state: Mutex<StreamState<T>>,
    // Suspend 策略下串行化发送方
    emit_gate: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

struct StreamState<T> {
    next_seq: u64,
    next_id: u64,
    history: VecDeque<Event<T>>,
    subscribers: HashMap<SubscriptionId, Arc<Slot<T>>>,
    closed: bool,
}

impl<T> StreamState<T> {
    /// 分配序号并写入历史
    fn append(&mut self, value: T, replay_capacity: usize) -> Event<T> {
        let event = Event::new(self.next_seq, value);
        self.next_seq += 1;

        if replay_capacity > 0 {
            if self.history.len() == replay_capacity {
                self.history.pop_front();
            }
            self.history.push_back(event.clone());
        }
        event
    }
}

impl<T> Shared<T> {
    fn lock_state(&self) -> MutexGuard<'_, StreamState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 丢弃策略：整个发送在流锁内完成，不会挂起
    fn emit_lossy(&self, value: T) -> Result<Event<T>, TryEmitError<T>> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(TryEmitError::Closed(value));
        }

        let event = state.append(value, self.config.replay_capacity);
        for slot in state.subscribers.values() {
            match slot.offer(&event, self.config.overflow_policy) {
                Offer::DroppedOldest(evicted) => trace!(
                    subscription = %slot.id(),
                    seq = event.seq(),
                    evicted = ?evicted,
                    "queue full, oldest dropped"
                ),
                Offer::DroppedLatest => trace!(
                    subscription = %slot.id(),
                    seq = event.seq(),
                    "queue full, latest dropped"
                ),
                _ => {}
            }
        }
        trace!(seq = event.seq(), subscribers = state.subscribers.len(), "event emitted");
        Ok(event)
    }

    /// 写入历史并取得当前订阅者快照；此后加入的订阅者通过回放获得该事件
    fn record(&self, value: T) -> StreamResult<(Event<T>, Vec<Arc<Slot<T>>>)> {
        let mut state = self.lock_state();
        if state.closed {
            return Err(StreamError::Closed);
        }

        let event = state.append(value, self.config.replay_capacity);
        let targets = state.subscribers.values().cloned().collect::<Vec<_>>();
        trace!(seq = event.seq(), subscribers = targets.len(), "event emitted");
        Ok((event, targets))
    }

    /// Suspend 策略下向单个订阅者投递，必要时等待空间
    async fn deliver(&self, slot: &Slot<T>, event: &Event<T>) -> StreamResult<()> {
        loop {
            let space = slot.space_notified();
            match slot.offer(event, OverflowPolicy::Suspend) {
                Offer::Full => {
                    trace!(subscription = %slot.id(), seq = event.seq(), "queue full, emit suspended");
                    space.await;
                }
                Offer::Sealed => return Err(StreamError::Closed),
                _ => return Ok(()),
            }
        }
    }

    pub(crate) fn detach(&self, slot: &Arc<Slot<T>>) {
        let id = slot.id();
        let mut state = self.lock_state();
        let owned = state
            .subscribers
            .get(&id)
            .is_some_and(|s| Arc::ptr_eq(s, slot));
        if owned {
            state.subscribers.remove(&id);
            debug!(subscription = %id, subscribers = state.subscribers.len(), "unsubscribed");
        }
        slot.detach();
    }

    fn close(&self) {
        let mut state = self.lock_state();
        if state.closed {
            return;
        }
        state.closed = true;

        let subscribers = std::mem::take(&mut state.subscribers);
        for slot in subscribers.values() {
            slot.seal();
        }
        debug!(
            last_seq = state.next_seq - 1,
            subscribers = subscribers.len(),
            "stream closed"
        );
        drop(state);

        self.shutdown.cancel();
    }
}

// 最后一个句柄释放时视同关闭，避免订阅者永久等待
impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.closed {
            state.closed = true;
            for (_, slot) in state.subscribers.drain() {
                slot.seal();
            }
        }
        self.shutdown.cancel();
    }
}
