//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the next attempt after `consecutive_failures` failed attempts.
///
/// Zero failures means no delay. The delay doubles per failure, is capped at
/// `max_ms`, and gets up to 10% jitter so several instances pointed at the same
/// provider do not retry in lockstep.
pub fn calculate_backoff(consecutive_failures: u32, base_ms: u64, max_ms: u64) -> Duration {
    if consecutive_failures == 0 {
        return Duration::ZERO;
    }

    let exponent = consecutive_failures.saturating_sub(1).min(32);
    let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}
