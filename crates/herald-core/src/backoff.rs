//! Backoff shared by the retry layers.

use std::time::Duration;

/// Exponential backoff for a zero-based retry `attempt`, capped at `max_ms`
/// and jittered to 0.8x..1.2x. An `initial_ms` of zero disables waiting.
pub fn jittered(attempt: u32, initial_ms: u64, max_ms: u64) -> Duration {
    if initial_ms == 0 {
        return Duration::ZERO;
    }
    let ms = initial_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(max_ms);
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}
