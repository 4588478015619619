use anyhow::Result as AnyResult;
use futures_util::StreamExt;
use replay_stream::{Event, EventSink, OverflowPolicy, ReplayStream, StreamConfig, Subscription};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Reading {
    Temperature(f32),
    Humidity(u8),
}

impl Display for Reading {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature(c) => write!(f, "{c:.1}°C"),
            Self::Humidity(p) => write!(f, "{p}%"),
        }
    }
}

fn describe(event: &Event<Reading>) -> String {
    format!(
        "#{} {} @ {}",
        event.seq(),
        event.value(),
        event.emitted_at().format("%H:%M:%S%.3f")
    )
}

fn drain(sub: &mut Subscription<Reading>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(Some(event)) = sub.try_next() {
        out.push(describe(&event));
    }
    out
}

/// 背压演示的配置，可通过 `DEMO_STREAM_CONFIG` 以 JSON 覆盖
fn backpressure_config() -> AnyResult<StreamConfig> {
    match std::env::var("DEMO_STREAM_CONFIG") {
        Ok(raw) => Ok(StreamConfig::from_json(&raw)?),
        Err(_) => Ok(StreamConfig::builder()
            .replay_capacity(0)
            .buffer_capacity(2)
            .overflow_policy(OverflowPolicy::Suspend)
            .build()),
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 状态语义：只保留最新值
    let state = ReplayStream::new(StreamConfig::state())?;
    let mut dashboard = state.subscribe();
    for c in [20.5, 21.0, 21.7] {
        state.emit(Reading::Temperature(c)).await?;
    }
    info!(latest = ?state.latest().map(|e| *e.value()), "state stream");
    println!("dashboard (conflated): {:?}", drain(&mut dashboard));
    let mut late_dashboard = state.subscribe();
    println!("late dashboard: {:?}", drain(&mut late_dashboard));

    // 事件语义：回放最近 3 条
    let log = ReplayStream::new(StreamConfig::events(3))?;
    let sink: &dyn EventSink<Reading> = &log;
    sink.emit_all((40..45).map(Reading::Humidity).collect()).await?;
    let mut auditor = log.subscribe();
    println!("auditor replay: {:?}", drain(&mut auditor));

    // 丢弃策略：慢订阅者只保留最近的事件
    for policy in [OverflowPolicy::DropOldest, OverflowPolicy::DropLatest] {
        let lossy = ReplayStream::new(
            StreamConfig::builder()
                .buffer_capacity(2)
                .overflow_policy(policy)
                .build(),
        )?;
        let mut slow = lossy.subscribe();
        for c in 0..5 {
            lossy.emit(Reading::Temperature(c as f32)).await?;
        }
        println!("{policy}: slow subscriber kept {:?}", drain(&mut slow));
    }

    // Suspend：生产者等待慢消费者
    let backpressure = ReplayStream::new(backpressure_config()?)?;
    let consumer = tokio::spawn({
        let events = backpressure.subscribe().into_stream();
        async move {
            events
                .then(|event| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    describe(&event)
                })
                .collect::<Vec<_>>()
                .await
        }
    });

    let started = std::time::Instant::now();
    for p in 60..66 {
        backpressure.emit(Reading::Humidity(p)).await?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "emitted");
    }
    backpressure.close();
    println!("consumer saw: {:?}", consumer.await?);

    match backpressure.emit(Reading::Humidity(0)).await {
        Err(err) if err.is_closed() => println!("emit after close: {err}"),
        other => println!("emit after close: {other:?}"),
    }

    Ok(())
}
