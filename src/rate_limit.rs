//! Sliding-window rate limiting for upstream API calls
//!
//! Keeps a time-ordered queue of past grant timestamps. A caller is
//! admitted once fewer than `max_requests` grants remain inside the
//! rolling window; otherwise it sleeps until the oldest grant leaves the
//! window and re-evaluates. Unlike a fixed bucket, the window slides
//! continuously, so bursts cannot pile up at bucket boundaries.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::RateLimit;

/// Sliding-window admission control for upstream calls.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            max_requests: limit.max_requests,
            window: limit.window,
            grants: Mutex::new(VecDeque::with_capacity(limit.max_requests)),
        }
    }

    /// Block until the caller may proceed without exceeding the limit.
    ///
    /// The lock is never held across the sleep: each iteration evicts
    /// stale grants, either records a grant and returns, or computes the
    /// wait until the oldest grant expires and sleeps outside the lock.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut grants = self.grants.lock().await;
                let now = Instant::now();
                Self::evict(&mut grants, now, self.window);

                if grants.len() < self.max_requests {
                    grants.push_back(now);
                    return;
                }

                match grants.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => return,
                }
            };

            log::debug!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of grants currently inside the window (for observability).
    pub async fn current_count(&self) -> usize {
        let mut grants = self.grants.lock().await;
        Self::evict(&mut grants, Instant::now(), self.window);
        grants.len()
    }

    fn evict(grants: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = grants.front() {
            if now.duration_since(*oldest) >= window {
                grants.pop_front();
            } else {
                break;
            }
        }
    }
}
