//! Sliding-window request counter per client.
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Client maps larger than this are swept of idle clients on the next check.
const SWEEP_THRESHOLD: usize = 4_096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a request for `client_id` unless the window is already full.
    /// Denied requests are not recorded.
    pub fn check(&self, client_id: &str) -> RateDecision {
        let now = Instant::now();
        let mut clients = self.lock();

        if clients.len() > SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, hits| hits.back().is_some_and(|t| now - *t < window));
        }

        let hits = clients.entry(client_id.to_string()).or_default();
        while hits.front().is_some_and(|t| now - *t >= self.window) {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            let oldest = hits.front().copied().unwrap_or(now);
            let remaining = self.window.saturating_sub(now - oldest);
            let retry_after = Duration::from_secs(remaining.as_secs_f64().ceil() as u64)
                .max(Duration::from_secs(1));
            return RateDecision::Denied { retry_after };
        }

        hits.push_back(now);
        RateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn denies_past_the_ceiling_until_window_slides() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 30);
        for _ in 0..30 {
            assert_eq!(limiter.check("1.2.3.4"), RateDecision::Allowed);
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(
            limiter.check("1.2.3.4"),
            RateDecision::Denied {
                retry_after: Duration::from_secs(40)
            }
        );
        assert_eq!(limiter.check("5.6.7.8"), RateDecision::Allowed);

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(limiter.check("1.2.3.4"), RateDecision::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert_eq!(limiter.check("c"), RateDecision::Allowed);

        tokio::time::advance(Duration::from_millis(59_900)).await;
        assert_eq!(
            limiter.check("c"),
            RateDecision::Denied {
                retry_after: Duration::from_secs(1)
            }
        );
    }
}
