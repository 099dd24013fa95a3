//! Bounded waits for asynchronous pipeline effects

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use walk_common::events::WalkEvent;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive events until one matches `predicate`
///
/// Panics after [`WAIT_TIMEOUT`] so a broken pipeline fails instead of hanging.
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<WalkEvent>, mut predicate: F) -> WalkEvent
where
    F: FnMut(&WalkEvent) -> bool,
{
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;

    match result {
        Ok(event) => event,
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Poll `condition` every 10ms until it holds
pub async fn wait_until<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting until {}", description);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
