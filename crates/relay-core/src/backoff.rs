//! Exponential backoff shared by the upstream retry loop and the supervisor.

use std::time::Duration;

/// Raw backoff formula: `base × multiplier^(attempt-1)` for `attempt ≥ 1`, else zero.
pub fn delay(attempt: u32, base: Duration, multiplier: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let secs = base.as_secs_f64() * multiplier.powi(exponent);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// A backoff schedule with an optional cap on the exponent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    /// Largest exponent applied; keeps the maximum wait bounded.
    pub max_exponent: Option<u32>,
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64) -> Self {
        Self {
            base,
            multiplier,
            max_exponent: None,
        }
    }

    pub fn with_max_exponent(mut self, max_exponent: u32) -> Self {
        self.max_exponent = Some(max_exponent);
        self
    }

    /// Upstream calls: 1s, 2s, 4s, …
    pub fn upstream() -> Self {
        Self::new(Duration::from_secs(1), 2.0)
    }

    /// Supervisor restarts: base seconds doubled per restart, exponent capped at 5.
    pub fn restart(base_secs: u64) -> Self {
        Self::new(Duration::from_secs(base_secs), 2.0).with_max_exponent(5)
    }

    /// Delay before attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = match self.max_exponent {
            Some(cap) => attempt.min(cap.saturating_add(1)),
            None => attempt,
        };
        // Clamp so absurd attempt counts cannot overflow Duration.
        let capped = attempt.min(64);
        delay(capped, self.base, self.multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempt_has_no_delay() {
        assert_eq!(delay(0, Duration::from_secs(5), 2.0), Duration::ZERO);
    }

    #[test]
    fn first_attempt_is_base() {
        assert_eq!(delay(1, Duration::from_secs(1), 2.0), Duration::from_secs(1));
        assert_eq!(BackoffPolicy::restart(5).delay(1), Duration::from_secs(5));
    }

    #[test]
    fn upstream_schedule_doubles() {
        let p = BackoffPolicy::upstream();
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(2), Duration::from_secs(2));
        assert_eq!(p.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn restart_schedule_caps_exponent_at_five() {
        let p = BackoffPolicy::restart(5);
        assert_eq!(p.delay(6), Duration::from_secs(160));
        assert_eq!(p.delay(7), Duration::from_secs(160));
        assert_eq!(p.delay(100), Duration::from_secs(160));
    }

    #[test]
    fn delay_is_non_decreasing() {
        for policy in [BackoffPolicy::upstream(), BackoffPolicy::restart(5)] {
            let mut prev = Duration::ZERO;
            for attempt in 0..40 {
                let d = policy.delay(attempt);
                assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
                prev = d;
            }
        }
    }

    #[test]
    fn fractional_multiplier_supported() {
        let d = delay(3, Duration::from_millis(100), 1.5);
        assert_eq!(d, Duration::from_millis(225));
    }
}
