//! 事件（Event）
//!
//! 发出时分配序号的不可变值。序号在单个流内从 1 开始严格递增，
//! 值以 `Arc` 共享，扇出到多个订阅者时不要求 `T: Clone`。
//!
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// 流内事件
pub struct Event<T> {
    seq: u64,
    emitted_at: DateTime<Utc>,
    value: Arc<T>,
}

impl<T> Event<T> {
    pub(crate) fn new(seq: u64, value: T) -> Self {
        Self {
            seq,
            emitted_at: Utc::now(),
            value: Arc::new(value),
        }
    }

    /// 发出时分配的序号
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn emitted_at(&self) -> &DateTime<Utc> {
        &self.emitted_at
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// 共享的值句柄
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    pub fn into_value(self) -> Arc<T> {
        self.value
    }
}

// 手动实现：克隆只复制 Arc，不要求 T: Clone
impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            emitted_at: self.emitted_at,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("seq", &self.seq)
            .field("emitted_at", &self.emitted_at)
            .field("value", &self.value)
            .finish()
    }
}
