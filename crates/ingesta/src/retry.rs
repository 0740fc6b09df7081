//! Randomized side of the backoff policy.

use std::time::Duration;

use ingesta_core::retry::RetryPolicy;
use rand::Rng;

/// Delay before the attempt that follows failed attempt number `attempt`,
/// with jitter drawn from the thread RNG.
pub fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let sample: f64 = rand::rng().random();
    policy.delay(attempt, sample)
}

/// Sleep for `delay`, skipping the timer entirely when it is zero.
pub async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
