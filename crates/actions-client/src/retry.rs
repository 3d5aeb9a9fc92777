//! Retry strategies deciding whether (and after which delay) a failed request is repeated.

use rand::Rng as _;

use std::{fmt, sync::Arc, time::Duration};

/// Jitter function applied to the un-jittered back-off delay.
///
/// The function receives the upper bound of the delay for the current attempt and returns
/// the delay to actually wait.
pub type Entropy = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

/// Stateful decision function for a single logical request.
///
/// Each call corresponds to a failed attempt. `Some(delay)` means that the request should be
/// repeated after `delay`; `None` means that the strategy is exhausted and the last error
/// should be returned to the caller.
pub trait RetryStrategy: Send {
    /// Returns the delay before the next attempt, or `None` if no more attempts are allowed.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Strategy that never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn next_delay(&mut self) -> Option<Duration> {
        None
    }
}

/// Exponential back-off with pluggable jitter.
///
/// On the `n`th call (0-based), the strategy returns `entropy(2^n * base)` as long as
/// `n < retry_count`. The default entropy picks a uniformly distributed delay in `[0, bound)`;
/// a zero bound yields a zero delay.
#[derive(Clone)]
pub struct ExponentialBackOff {
    base: Duration,
    retry_count: u32,
    entropy: Option<Entropy>,
    n: u32,
}

impl fmt::Debug for ExponentialBackOff {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExponentialBackOff")
            .field("base", &self.base)
            .field("retry_count", &self.retry_count)
            .field("custom_entropy", &self.entropy.is_some())
            .field("n", &self.n)
            .finish()
    }
}

impl ExponentialBackOff {
    /// Creates a strategy with the specified base delay and maximum number of retries.
    pub fn new(base: Duration, retry_count: u32) -> Self {
        Self {
            base,
            retry_count,
            entropy: None,
            n: 0,
        }
    }

    /// Replaces the default uniform jitter with the provided function.
    #[must_use]
    pub fn with_entropy<F>(mut self, entropy: F) -> Self
    where
        F: Fn(Duration) -> Duration + Send + Sync + 'static,
    {
        self.entropy = Some(Arc::new(entropy));
        self
    }

    /// Returns the base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Returns the maximum number of retries.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the number of retries granted so far.
    pub fn attempts(&self) -> u32 {
        self.n
    }

    fn upper_bound(&self) -> Duration {
        2_u32
            .checked_pow(self.n)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl RetryStrategy for ExponentialBackOff {
    fn next_delay(&mut self) -> Option<Duration> {
        if self.n >= self.retry_count {
            return None;
        }

        let bound = self.upper_bound();
        let delay = match &self.entropy {
            Some(entropy) => entropy(bound),
            None => uniform_jitter(bound),
        };
        self.n += 1;
        Some(delay)
    }
}

/// Picks a uniformly distributed delay in `[0, bound)`.
pub fn uniform_jitter(bound: Duration) -> Duration {
    let nanos = u64::try_from(bound.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..nanos))
}

/// Template from which a fresh [`RetryStrategy`] is produced for every logical request.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Do not retry.
    #[default]
    Never,
    /// Use exponential back-off. The contained value is cloned for each request, so its
    /// attempt counter always starts from zero.
    ExponentialBackOff(ExponentialBackOff),
}

impl From<ExponentialBackOff> for RetryPolicy {
    fn from(strategy: ExponentialBackOff) -> Self {
        Self::ExponentialBackOff(ExponentialBackOff { n: 0, ..strategy })
    }
}

impl RetryPolicy {
    /// Creates a strategy for a new logical request.
    pub fn strategy(&self) -> Box<dyn RetryStrategy> {
        match self {
            Self::Never => Box::new(NoRetry),
            Self::ExponentialBackOff(template) => Box::new(ExponentialBackOff {
                n: 0,
                ..template.clone()
            }),
        }
    }
}
