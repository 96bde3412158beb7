use std::time::Duration;

use async_trait::async_trait;

/// Request-rate throttle between upstream calls. The fixed delays are a
/// scheduling policy knob, not a correctness mechanism, so they sit behind
/// this seam and tests can run many cycles without wall-clock sleeps.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Production throttle: a plain blocking wait.
pub struct FixedDelay;

#[async_trait]
impl Throttle for FixedDelay {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test throttle that returns immediately.
pub struct NoThrottle;

#[async_trait]
impl Throttle for NoThrottle {
    async fn pause(&self, _duration: Duration) {}
}
