//! Exponential backoff with jitter for receipt polling.

use rand::Rng;
use std::time::Duration;

/// Delay before the `attempt`-th poll: `base * 2^(attempt-1)`, capped at `max`,
/// plus up to 10% jitter so concurrent waiters do not poll in lockstep.
pub fn poll_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    let delay = base.saturating_mul(factor).min(max);

    let jitter_ms = (delay.as_millis() / 10) as u64;
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}
