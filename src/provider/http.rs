//! Shared HTTP plumbing: retry with backoff and request-rate capping.

use super::{ProviderError, ProviderResult};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Enforces a minimum interval between requests to one origin.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Seconds from a `Retry-After` header, when the server sent one.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate_body(body: String) -> String {
    const MAX: usize = 500;
    if body.len() > MAX {
        let end = body
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &body[..end])
    } else {
        body
    }
}

/// Send a request with retries on 429/5xx and transport hiccups.
///
/// `build` must produce a fresh `RequestBuilder` per attempt (builders are
/// consumed by `send`). Server retry hints take precedence over the
/// exponential schedule.
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    limiter: Option<&RateLimiter>,
    provider: &str,
    build: F,
) -> ProviderResult<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let Some(limiter) = limiter {
            limiter.acquire().await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let transient =
                    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                if transient && attempt < policy.max_attempts {
                    let delay = retry_after(&response).unwrap_or_else(|| policy.delay_for(attempt));
                    warn!(
                        provider,
                        status = status.as_u16(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                let message = truncate_body(response.text().await.unwrap_or_default());
                return Err(ProviderError::Status {
                    provider: provider.to_string(),
                    status: status.as_u16(),
                    message,
                });
            }
            Err(e) if attempt < policy.max_attempts && (e.is_timeout() || e.is_connect()) => {
                let delay = policy.delay_for(attempt);
                debug!(provider, attempt, error = %e, "transport error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = truncate_body(body);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= 504);
    }
}
