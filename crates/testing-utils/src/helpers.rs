//! 测试辅助函数

use std::future::Future;
use std::time::Duration;

use taskq_infrastructure::EventEnvelope;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// 测试环境工具
pub struct TestEnv;

impl TestEnv {
    /// 在超时前轮询等待条件成立
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// 取出接收端中已有的全部事件
pub fn drain_events(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// 已收集事件的类型列表
pub fn event_types(events: &[EventEnvelope]) -> Vec<&str> {
    events.iter().map(|e| e.event_type.as_str()).collect()
}
