//! Pause schedule between token fetch attempts.

use std::time::Duration;

/// Geometric schedule: `first`, then `first * multiplier`, and so on up to `cap`.
///
/// With the default (50ms, x2, 5s) a three-attempt policy pauses 50ms and 100ms.
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialBackoff {
    first: Duration,
    multiplier: u32,
    cap: Duration,
    jitter: Option<f64>,
}

impl ExponentialBackoff {
    pub fn new(first: Duration, multiplier: u32, cap: Duration) -> Self {
        Self {
            first,
            multiplier: multiplier.max(1),
            cap,
            jitter: None,
        }
    }

    /// Spread each pause uniformly over `delay * (1 ± fraction)`.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        self.jitter = (fraction > 0.0).then_some(fraction);
        self
    }

    /// Pause after the `failed_attempt`-th failure (1-based).
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let steps = failed_attempt.saturating_sub(1);
        let delay = self
            .multiplier
            .checked_pow(steps)
            .and_then(|factor| self.first.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap));

        match self.jitter {
            Some(fraction) => {
                delay.mul_f64(1.0 - fraction + rand::random::<f64>() * 2.0 * fraction)
            }
            None => delay,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), 2, Duration::from_secs(5))
    }
}
