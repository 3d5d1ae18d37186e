//! Courtesy throttling for outbound metadata requests.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub trait RateLimiter: Send + Sync {
    /// Block until the next outbound call is allowed.
    fn acquire(&self);
}

/// Spaces consecutive calls at least `interval` apart, across all threads.
pub struct FixedIntervalGate {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl FixedIntervalGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }
}

impl RateLimiter for FixedIntervalGate {
    fn acquire(&self) {
        let mut last = self.last_call.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct Unthrottled;

impl RateLimiter for Unthrottled {
    fn acquire(&self) {}
}

/// Gate for `delay`, or no throttling at all for a zero delay.
pub fn from_delay(delay: Duration) -> Box<dyn RateLimiter> {
    if delay.is_zero() {
        Box::new(Unthrottled)
    } else {
        Box::new(FixedIntervalGate::new(delay))
    }
}
