use anyhow::Result as AnyResult;
use replay_stream::{
    OverflowPolicy, ReplayStream, StreamConfig, StreamError, Subscription, TryEmitError,
};
use std::time::Duration;
use tokio::time::timeout;

fn drain_seqs<T>(sub: &mut Subscription<T>) -> Vec<u64> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = sub.try_next() {
        out.push(event.seq());
    }
    out
}

fn config(replay: usize, buffer: usize, policy: OverflowPolicy) -> StreamConfig {
    StreamConfig::builder()
        .replay_capacity(replay)
        .buffer_capacity(buffer)
        .overflow_policy(policy)
        .build()
}

#[tokio::test]
async fn drop_oldest_idle_subscriber_receives_last_buffer_events() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 3, OverflowPolicy::DropOldest))?;
    let mut sub = stream.subscribe();

    for i in 0..10 {
        stream.emit(i).await?;
    }
    assert_eq!(drain_seqs(&mut sub), vec![8, 9, 10]);
    Ok(())
}

#[tokio::test]
async fn drop_latest_full_queue_is_unchanged_until_consumed() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 2, OverflowPolicy::DropLatest))?;
    let mut sub = stream.subscribe();

    for i in 1..=5 {
        stream.emit(i).await?;
        assert!(sub.pending() <= 2);
    }
    assert_eq!(sub.pending(), 2);

    let first = sub.try_next()?.expect("queued event");
    assert_eq!(first.seq(), 1);

    stream.emit(6).await?;
    stream.emit(7).await?;
    assert_eq!(drain_seqs(&mut sub), vec![2, 6]);
    Ok(())
}

// 淘汰后游标指向仍保留的最旧事件
#[tokio::test]
async fn cursor_skips_evicted_events() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 2, OverflowPolicy::DropOldest))?;
    let mut sub = stream.subscribe();
    assert_eq!(sub.cursor(), 1);

    for i in 1..=5 {
        stream.emit(i).await?;
    }
    assert_eq!(sub.pending(), 2);
    assert_eq!(sub.cursor(), 4);

    assert_eq!(sub.try_next()?.expect("queued event").seq(), 4);
    assert_eq!(sub.cursor(), 5);
    assert_eq!(sub.try_next()?.expect("queued event").seq(), 5);
    assert_eq!(sub.cursor(), 6);
    Ok(())
}

// 回放容量大于缓冲容量时，不消费的订阅者保留最近 max(replay, buffer) 条
#[tokio::test]
async fn drop_oldest_retains_replay_capacity_when_larger() -> AnyResult<()> {
    let stream = ReplayStream::new(config(4, 2, OverflowPolicy::DropOldest))?;
    let mut sub = stream.subscribe();

    for i in 1..=6 {
        stream.emit(i).await?;
    }
    assert_eq!(sub.cursor(), 3);
    assert_eq!(drain_seqs(&mut sub), vec![3, 4, 5, 6]);
    Ok(())
}

// 一个订阅者的丢弃不影响另一个订阅者
#[tokio::test]
async fn drop_decisions_are_per_subscriber() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 2, OverflowPolicy::DropOldest))?;
    let mut fast = stream.subscribe();
    let mut slow = stream.subscribe();

    let mut fast_seen = Vec::new();
    for i in 0..6 {
        stream.emit(i).await?;
        fast_seen.extend(drain_seqs(&mut fast));
    }

    assert_eq!(fast_seen, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(drain_seqs(&mut slow), vec![5, 6]);
    Ok(())
}

#[tokio::test]
async fn suspend_blocks_until_consumer_makes_room() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 1, OverflowPolicy::Suspend))?;
    let mut sub = stream.subscribe();

    stream.emit(1).await?;
    let producer = tokio::spawn({
        let stream = stream.clone();
        async move { stream.emit(2).await }
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!producer.is_finished());

    let first = sub.next().await?;
    assert_eq!(*first.value(), 1);

    let emitted = timeout(Duration::from_secs(1), producer).await???;
    assert_eq!(emitted.seq(), 2);
    assert_eq!(*sub.next().await?.value(), 2);
    Ok(())
}

// 取消挂起的 emit 不会破坏流：订阅者仍按序收到后续事件
#[tokio::test]
async fn cancelled_suspended_emit_leaves_stream_consistent() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 1, OverflowPolicy::Suspend))?;
    let mut sub = stream.subscribe();

    stream.emit("one").await?;
    let cancelled = timeout(Duration::from_millis(30), stream.emit("two")).await;
    assert!(cancelled.is_err());

    let producer = tokio::spawn({
        let stream = stream.clone();
        async move { stream.emit("three").await }
    });

    let first = sub.next().await?;
    let second = timeout(Duration::from_secs(1), sub.next()).await??;
    producer.await??;

    assert_eq!((*first.value(), first.seq()), ("one", 1));
    assert_eq!((*second.value(), second.seq()), ("three", 3));
    Ok(())
}

#[tokio::test]
async fn try_emit_on_full_suspend_stream_returns_value() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 1, OverflowPolicy::Suspend))?;
    let mut sub = stream.subscribe();

    stream.try_emit(1).map_err(|e| anyhow::anyhow!("{e}"))?;
    match stream.try_emit(2) {
        Err(TryEmitError::WouldSuspend(v)) => assert_eq!(v, 2),
        other => panic!("unexpected: {other:?}"),
    }
    // 失败的 try_emit 不分配序号
    assert_eq!(stream.last_seq(), 1);

    sub.try_next()?;
    let event = stream.try_emit(3).map_err(|e| anyhow::anyhow!("{e}"))?;
    assert_eq!(event.seq(), 2);

    stream.close();
    assert_eq!(stream.try_emit(4).unwrap_err().into_inner(), 4);
    Ok(())
}

#[tokio::test]
async fn try_emit_on_lossy_stream_never_suspends() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 1, OverflowPolicy::DropLatest))?;
    let mut sub = stream.subscribe();

    for i in 0..5 {
        assert!(stream.try_emit(i).is_ok());
    }
    assert_eq!(drain_seqs(&mut sub), vec![1]);
    Ok(())
}

// 零容量 Suspend 流：emit 等到订阅者在 next() 中等待时才完成交接
#[tokio::test]
async fn rendezvous_stream_hands_off_to_waiting_consumer() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 0, OverflowPolicy::Suspend))?;
    let mut sub = stream.subscribe();

    let idle = timeout(Duration::from_millis(30), stream.emit(0)).await;
    assert!(idle.is_err());

    let consumer = tokio::spawn(async move {
        let event = sub.next().await?;
        Ok::<_, StreamError>(*event.value())
    });

    timeout(Duration::from_secs(1), stream.emit(42)).await??;
    assert_eq!(consumer.await??, 42);
    Ok(())
}

#[tokio::test]
async fn unsubscribe_releases_suspended_emit() -> AnyResult<()> {
    let stream = ReplayStream::new(config(0, 1, OverflowPolicy::Suspend))?;
    let blocker = stream.subscribe();
    stream.emit(1).await?;

    let producer = tokio::spawn({
        let stream = stream.clone();
        async move { stream.emit(2).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    stream.unsubscribe(&blocker);
    timeout(Duration::from_secs(1), producer).await???;
    assert_eq!(stream.subscriber_count(), 0);
    Ok(())
}
