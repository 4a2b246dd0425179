use std::{fmt, sync::Arc, time::Duration};

use rand::Rng;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(100);
/// Doubling stops here so the multiplier cannot overflow.
const MAX_EXPONENT: u32 = 16;

type DelayFn = Arc<dyn Fn(usize) -> Duration + Send + Sync>;

/// Delay applied between retryable attempts.
///
/// Attempt numbers passed to the policy are 1-based: `delay(1)` is the wait
/// after the first failed attempt.
#[derive(Clone)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)` plus uniform jitter in `[0, max_jitter)`.
    Exponential { base: Duration, max_jitter: Duration },
    Constant(Duration),
    /// Caller-supplied delay function.
    Custom(DelayFn),
}

impl Backoff {
    pub fn exponential(base: Duration, max_jitter: Duration) -> Self {
        Self::Exponential { base, max_jitter }
    }

    pub fn constant(delay: Duration) -> Self {
        Self::Constant(delay)
    }

    /// Retries immediately.
    pub fn none() -> Self {
        Self::Constant(Duration::ZERO)
    }

    pub fn custom<F>(delay: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(delay))
    }

    /// Delay before the attempt following `attempt`.
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Self::Exponential { max_jitter, .. } => {
                self.base_delay(attempt).saturating_add(jitter(*max_jitter))
            }
            _ => self.base_delay(attempt),
        }
    }

    /// Deterministic part of [`Backoff::delay`].
    pub fn base_delay(&self, attempt: usize) -> Duration {
        match self {
            Self::Exponential { base, .. } => {
                let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT as usize) as u32;
                base.saturating_mul(1u32 << exponent)
            }
            Self::Constant(delay) => *delay,
            Self::Custom(delay) => delay(attempt),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_BASE_DELAY, DEFAULT_MAX_JITTER)
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exponential { base, max_jitter } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max_jitter", max_jitter)
                .finish(),
            Self::Constant(delay) => f.debug_tuple("Constant").field(delay).finish(),
            Self::Custom(_) => write!(f, "Custom(<function>)"),
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}
