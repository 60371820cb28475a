//! Delay policy between upstream requests

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioThrottle;

#[async_trait]
impl Throttle for TokioThrottle {
    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Returns immediately. Used by tests and dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoThrottle;

#[async_trait]
impl Throttle for NoThrottle {
    async fn pause(&self, _delay: Duration) {}
}
