use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

/// Randomized spread added on top of the exponential delay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Upper bound of the extra delay as a fraction of the exponential delay; 0 disables jitter
    pub ratio: f64,
    /// Fixed seed for reproducible delays
    pub seed: Option<u64>,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            ratio: 0.5,
            seed: None,
        }
    }
}

impl JitterConfig {
    pub fn disabled() -> Self {
        Self {
            ratio: 0.0,
            seed: None,
        }
    }
}

/// How an HTTP status from the sync endpoint is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 5xx and 429: retried with backoff
    Transient,
    /// Any other status: surfaced immediately
    Permanent,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}

/// Exponential backoff with optional jitter.
///
/// Retry `n` (1-based) waits `base_delay * 2^(n-1)`, capped at `max_delay`, plus a uniform
/// jitter in `[0, delay * ratio]`.
#[derive(Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    jitter_ratio: f64,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    /// A policy without jitter
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_ratio: 0.0,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_jitter(mut self, jitter: &JitterConfig) -> Self {
        self.jitter_ratio = if jitter.ratio.is_finite() {
            jitter.ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.rng = Mutex::new(match jitter.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        self
    }

    /// Deterministic part of the wait before retry `retry`
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Full wait before retry `retry`, jitter included
    pub fn delay_for(&self, retry: u32) -> Duration {
        let backoff = self.backoff(retry);
        if self.jitter_ratio <= 0.0 || backoff.is_zero() {
            return backoff;
        }
        let spread = backoff.as_secs_f64() * self.jitter_ratio;
        let extra = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(0.0..=spread)
        };
        backoff + Duration::from_secs_f64(extra)
    }
}
