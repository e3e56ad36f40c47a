use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::app::{MurmurError, Result};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Quotas for one model endpoint. Zero disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub tokens_per_minute: u32,
}

#[derive(Debug, Default)]
struct Windows {
    minute_requests: VecDeque<Instant>,
    minute_tokens: VecDeque<(Instant, u32)>,
    day_requests: VecDeque<Instant>,
}

impl Windows {
    fn prune(&mut self, now: Instant) {
        while self
            .minute_requests
            .front()
            .is_some_and(|t| now.duration_since(*t) >= MINUTE)
        {
            self.minute_requests.pop_front();
        }
        while self
            .minute_tokens
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) >= MINUTE)
        {
            self.minute_tokens.pop_front();
        }
        while self
            .day_requests
            .front()
            .is_some_and(|t| now.duration_since(*t) >= DAY)
        {
            self.day_requests.pop_front();
        }
    }

    fn tokens_in_window(&self) -> u64 {
        self.minute_tokens.iter().map(|(_, n)| u64::from(*n)).sum()
    }
}

/// Sliding-window limiter shared by every discoverer call.
///
/// Per-minute limits wait for room; the daily limit fails fast.
#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimits,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Reserve room for one request of about `tokens` input tokens
    pub async fn acquire(&self, tokens: u32) -> Result<()> {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let now = Instant::now();
                windows.prune(now);

                let day_limit = self.limits.requests_per_day;
                if day_limit > 0 && windows.day_requests.len() >= day_limit as usize {
                    return Err(MurmurError::QuotaExhausted(format!(
                        "{} requests per day used",
                        day_limit
                    )));
                }

                let mut wait = Duration::ZERO;

                let rpm = self.limits.requests_per_minute;
                if rpm > 0 && windows.minute_requests.len() >= rpm as usize {
                    if let Some(oldest) = windows.minute_requests.front() {
                        wait = wait.max(MINUTE.saturating_sub(now.duration_since(*oldest)));
                    }
                }

                let tpm = u64::from(self.limits.tokens_per_minute);
                if tpm > 0
                    && !windows.minute_tokens.is_empty()
                    && windows.tokens_in_window() + u64::from(tokens) > tpm
                {
                    if let Some((oldest, _)) = windows.minute_tokens.front() {
                        wait = wait.max(MINUTE.saturating_sub(now.duration_since(*oldest)));
                    }
                }

                if wait.is_zero() {
                    windows.minute_requests.push_back(now);
                    windows.minute_tokens.push_back((now, tokens));
                    windows.day_requests.push_back(now);
                    return Ok(());
                }
                wait
            };

            debug!("Model rate limit reached, waiting {:?}", wait);
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: u32, rpd: u32, tpm: u32) -> RateLimits {
        RateLimits {
            requests_per_minute: rpm,
            requests_per_day: rpd,
            tokens_per_minute: tpm,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_per_minute_waits() {
        let limiter = RateLimiter::new(limits(2, 0, 0));
        let start = Instant::now();

        limiter.acquire(10).await.unwrap();
        limiter.acquire(10).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.acquire(10).await.unwrap();
        assert!(start.elapsed() >= MINUTE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_per_minute_waits() {
        let limiter = RateLimiter::new(limits(0, 0, 100));
        let start = Instant::now();

        limiter.acquire(60).await.unwrap();
        limiter.acquire(60).await.unwrap();
        assert!(start.elapsed() >= MINUTE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_request_passes_on_empty_window() {
        let limiter = RateLimiter::new(limits(0, 0, 100));
        let start = Instant::now();
        limiter.acquire(500).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_quota_fails_fast() {
        let limiter = RateLimiter::new(limits(0, 2, 0));
        limiter.acquire(1).await.unwrap();
        limiter.acquire(1).await.unwrap();

        let start = Instant::now();
        let err = limiter.acquire(1).await.unwrap_err();
        assert!(matches!(err, MurmurError::QuotaExhausted(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_request_stays_pending() {
        let limiter = RateLimiter::new(limits(1, 0, 0));
        tokio_test::assert_ok!(limiter.acquire(1).await);

        let mut waiting = tokio_test::task::spawn(limiter.acquire(1));
        tokio_test::assert_pending!(waiting.poll());

        tokio::time::advance(MINUTE + Duration::from_secs(1)).await;
        tokio_test::assert_ready_ok!(waiting.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(limits(1, 0, 0));
        limiter.acquire(1).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let start = Instant::now();
        limiter.acquire(1).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
