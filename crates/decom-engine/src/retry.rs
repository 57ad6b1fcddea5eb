use std::time::Duration;

use decom_core::config::RetrySettings;

/// Bounded retry with optional exponential backoff.
///
/// Used for every polling site: shutdown grace waits, fallback transport
/// attempts, and run-log lock contention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: 1.0,
            max_delay: None,
        }
    }

    pub fn with_backoff(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff = factor.max(1.0);
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay to wait after attempt `attempt` (1-based) fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let scaled = self.delay.as_secs_f64() * self.backoff.powi(exp);
        let delay = Duration::try_from_secs_f64(scaled.max(0.0)).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Upper bound on total time spent sleeping across all attempts.
    pub fn total_wait(&self) -> Duration {
        (1..self.attempts).fold(Duration::ZERO, |acc, a| acc.saturating_add(self.delay_after(a)))
    }

    /// Run `op` until it succeeds or attempts are exhausted; returns the last
    /// error. `op` receives the 1-based attempt number.
    pub fn retry<T, E>(&self, op: impl FnMut(u32) -> Result<T, E>) -> Result<T, E> {
        self.retry_while(op, |_| true)
    }

    /// Like [`retry`](Self::retry), but an error for which `transient`
    /// returns `false` is returned at once.
    pub fn retry_while<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        transient: impl Fn(&E) -> bool,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= attempts || !transient(&e) => return Err(e),
                Err(_) => {
                    std::thread::sleep(self.delay_after(attempt));
                    attempt += 1;
                }
            }
        }
    }

    /// Poll `check` until it reports `true`. Errors stop polling immediately.
    /// Returns `Ok(false)` when attempts run out.
    pub fn poll_until<E>(&self, mut check: impl FnMut() -> Result<bool, E>) -> Result<bool, E> {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if check()? {
                return Ok(true);
            }
            if attempt < attempts {
                std::thread::sleep(self.delay_after(attempt));
            }
        }
        Ok(false)
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(s: RetrySettings) -> Self {
        let policy = RetryPolicy::fixed(s.attempts, Duration::from_secs(s.delay_secs));
        match s.max_delay_secs {
            Some(max) => policy.with_backoff(s.backoff, Duration::from_secs(max)),
            None => RetryPolicy {
                backoff: s.backoff.max(1.0),
                ..policy
            },
        }
    }
}
