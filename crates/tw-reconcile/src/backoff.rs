//! Delay schedule between readiness checks

use std::time::Duration;

use tw_core::config::SettleConfig;

/// Exponentially growing, jittered delays bounded by a remaining budget
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    pub fn new(config: &SettleConfig) -> Self {
        Self {
            next: config.initial,
            max: config.max,
            multiplier: if config.multiplier.is_finite() {
                config.multiplier.max(1.0)
            } else {
                1.0
            },
            jitter: if config.jitter.is_nan() {
                0.0
            } else {
                config.jitter.clamp(0.0, 1.0)
            },
        }
    }

    /// Delay before the next check, clipped to `remaining`.
    ///
    /// `None` once nothing remains.
    pub fn next_within(&mut self, remaining: Duration) -> Option<Duration> {
        if remaining.is_zero() {
            return None;
        }

        let base = self.next;
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));

        // Jitter only ever lengthens the wait, by up to `jitter * base`
        let spread = base.mul_f64(self.jitter * rand::random::<f64>());
        Some((base + spread).min(remaining))
    }
}
