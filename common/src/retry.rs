// Retry delay strategies for steps that declare a retry limit
// The step's own retry limit bounds the attempts; a strategy only decides the
// wait before each re-attempt and may end retrying early by returning None.

use rand::Rng;
use std::time::Duration;

/// Retry strategy trait for calculating retry delays
pub trait RetryStrategy: Send + Sync {
    /// Delay before re-attempt number `attempt` (0-based); None stops retrying
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Re-attempt immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl RetryStrategy for NoDelay {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        Some(Duration::ZERO)
    }
}

/// Fixed delay retry strategy
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

/// Exponential backoff retry strategy with jitter
/// Sequence: base, base*3, base*9, ... capped at the maximum
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter_factor: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(base_delay_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Calculate exponential delay without jitter
    fn calculate_base_delay(&self, attempt: u32) -> u64 {
        let factor = 3_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }

    /// Add random jitter to spread re-attempts against the same host
    fn add_jitter_ms(&self, base_delay_ms: u64) -> u64 {
        if self.jitter_factor == 0.0 {
            return base_delay_ms;
        }

        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;
        let jitter_ms = if jitter_range_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        } else {
            0
        };

        base_delay_ms + jitter_ms
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        let base_delay_ms = self.calculate_base_delay(attempt);
        Some(Duration::from_millis(self.add_jitter_ms(base_delay_ms)))
    }
}
