//! Bounded retry with backoff

use std::time::Duration;

use cs_core::config::RetryConfig;

/// What to do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`; `attempt` is the consecutive failure count
    Retry { attempt: u32, delay: Duration },
    /// Budget exhausted
    GiveUp { attempts: u32 },
}

/// Counts consecutive failures and hands out delays.
///
/// With the default multiplier of 1.0 the delay is fixed.
pub struct RetryPolicy {
    config: RetryConfig,
    failures: u32,
    /// Next delay to hand out
    current: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let current = config.delay;
        Self {
            config,
            failures: 0,
            current,
        }
    }

    /// Record one failure and decide whether to retry
    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.failures > self.config.max_retries {
            return RetryDecision::GiveUp {
                attempts: self.failures,
            };
        }
        RetryDecision::Retry {
            attempt: self.failures,
            delay: self.next_delay(),
        }
    }

    /// Forget earlier failures after a stable run
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current = self.config.delay;
    }

    /// Consecutive failures so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// How long a run must last before it counts as a success
    pub fn stable_after(&self) -> Duration {
        self.config.stable_after
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;

        let next = Duration::from_secs_f64(self.current.as_secs_f64() * self.config.multiplier);
        self.current = std::cmp::min(next, self.config.max_delay);

        if self.config.jitter > 0.0 {
            let jitter_amount = delay.as_secs_f64() * self.config.jitter * rand::random::<f64>();
            delay + Duration::from_secs_f64(jitter_amount)
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_retries: u32, multiplier: f64) -> RetryConfig {
        RetryConfig {
            max_retries,
            delay: Duration::from_secs(5),
            multiplier,
            max_delay: Duration::from_secs(12),
            jitter: 0.0,
            stable_after: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_gives_up_after_cap() {
        let mut policy = RetryPolicy::new(config(3, 1.0));

        for attempt in 1..=3 {
            assert_eq!(
                policy.record_failure(),
                RetryDecision::Retry {
                    attempt,
                    delay: Duration::from_secs(5)
                }
            );
        }
        assert_eq!(policy.record_failure(), RetryDecision::GiveUp { attempts: 4 });
    }

    #[test]
    fn test_reset_forgets_failures() {
        let mut policy = RetryPolicy::new(config(3, 1.0));
        policy.record_failure();
        policy.record_failure();
        policy.reset();
        assert_eq!(policy.failures(), 0);

        for _ in 0..3 {
            assert!(matches!(policy.record_failure(), RetryDecision::Retry { .. }));
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut policy = RetryPolicy::new(config(5, 2.0));
        let delays: Vec<_> = (0..4)
            .map(|_| match policy.record_failure() {
                RetryDecision::Retry { delay, .. } => delay,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(12),
                Duration::from_secs(12)
            ]
        );
    }

    #[test]
    fn test_zero_retries_gives_up_immediately() {
        let mut policy = RetryPolicy::new(config(0, 1.0));
        assert_eq!(policy.record_failure(), RetryDecision::GiveUp { attempts: 1 });
    }
}
