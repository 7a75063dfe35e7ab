use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Requests-per-minute token bucket used to pace calls against IPED.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_min: u64,
    // token bucket modeled by current tokens and the time of last refill
    tokens: Mutex<(f64, Instant)>,
}

impl RateLimiter {
    pub fn new(requests_per_min: u64) -> Self {
        Self {
            requests_per_min,
            tokens: Mutex::new((requests_per_min as f64, Instant::now())),
        }
    }

    /// Wait until one request may be sent.
    pub async fn acquire(&self) {
        let capacity = self.requests_per_min as f64;
        if capacity <= 0.0 {
            return;
        }
        let refill_rate = capacity / 60.0; // tokens per second
        loop {
            let mut guard = self.tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *tokens = (*tokens + elapsed * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                break;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_up_to_capacity_does_not_wait() {
        let limiter = RateLimiter::new(120);
        let started = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_empty_bucket_waits_for_refill() {
        // 600 rpm refills one token every 100ms
        let limiter = RateLimiter::new(600);
        {
            let mut guard = limiter.tokens.lock().await;
            guard.0 = 0.0;
            guard.1 = Instant::now();
        }
        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
