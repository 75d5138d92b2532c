//! Retry policy for rate limits and transient network failures.
//!
//! Only two failure classes are recovered locally:
//! - HTTP 429, waiting for the server-requested interval, up to
//!   `max_rate_limit_retries` times
//! - network failures of idempotent requests, up to `max_network_retries` times
//!
//! Every wait goes through [`sleep_or_cancel`], so a caller-supplied
//! [`CancellationToken`] aborts the operation at the next suspension point.

use crate::errors::{RateLimitError, RateLimitInfo, TwitterError, TwitterResult};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Header with the request ceiling of the current window.
pub const RATE_LIMIT_LIMIT: &str = "x-rate-limit-limit";
/// Header with the requests left in the current window.
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
/// Header with the epoch second at which the window resets.
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

/// Retry bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after a 429 before giving up with `RateLimitExceeded`.
    pub max_rate_limit_retries: u32,
    /// Retries after a network failure.
    pub max_network_retries: u32,
    /// Wait applied to a 429 without any reset hint.
    pub default_retry_after: Duration,
    /// Base wait before retrying a network failure.
    pub network_retry_delay: Duration,
    /// Jitter factor applied to the network wait (0.0 disables it).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_retries: 3,
            max_network_retries: 1,
            default_retry_after: Duration::from_secs(30),
            network_retry_delay: Duration::from_secs(1),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Retry configuration that never retries.
    pub fn disabled() -> Self {
        Self {
            max_rate_limit_retries: 0,
            max_network_retries: 0,
            ..Default::default()
        }
    }

    /// Wait before retrying a network failure.
    pub fn network_backoff(&self) -> Duration {
        let base = self.network_retry_delay.as_millis() as f64;
        if self.jitter <= 0.0 || base == 0.0 {
            return self.network_retry_delay;
        }

        let spread = base * self.jitter;
        let delay = base + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(delay.max(0.0) as u64)
    }
}

/// Retry bookkeeping for one logical request.
#[derive(Debug)]
pub struct RetryState<'a> {
    config: &'a RetryConfig,
    idempotent: bool,
    rate_limit_retries: u32,
    network_retries: u32,
}

impl<'a> RetryState<'a> {
    /// Starts tracking a request.
    pub fn new(config: &'a RetryConfig, idempotent: bool) -> Self {
        Self {
            config,
            idempotent,
            rate_limit_retries: 0,
            network_retries: 0,
        }
    }

    /// Total retries performed so far.
    pub fn retries(&self) -> u32 {
        self.rate_limit_retries + self.network_retries
    }

    /// Returns the wait before the next attempt, or `None` when `error` must
    /// be surfaced. Consumes one retry from the matching budget.
    pub fn next_delay(&mut self, error: &TwitterError) -> Option<Duration> {
        match error {
            TwitterError::RateLimit(RateLimitError::RateLimited { retry_after, .. }) => {
                if self.rate_limit_retries >= self.config.max_rate_limit_retries {
                    return None;
                }
                self.rate_limit_retries += 1;
                Some(retry_after.unwrap_or(self.config.default_retry_after))
            }
            TwitterError::Network(_) => {
                if !self.idempotent || self.network_retries >= self.config.max_network_retries {
                    return None;
                }
                self.network_retries += 1;
                Some(self.config.network_backoff())
            }
            _ => None,
        }
    }

    /// Converts the last error into the error surfaced to the caller.
    pub fn finish(&self, error: TwitterError) -> TwitterError {
        match error {
            TwitterError::RateLimit(RateLimitError::RateLimited {
                detail,
                retry_after,
                ..
            }) => TwitterError::RateLimit(RateLimitError::RateLimitExceeded {
                retries: self.rate_limit_retries,
                retry_after,
                detail,
            }),
            other => other,
        }
    }
}

/// Parses the `x-rate-limit-*` headers.
pub fn rate_limit_info(headers: &HeaderMap) -> RateLimitInfo {
    let number = |name: &str| -> Option<i64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };

    RateLimitInfo {
        limit: number(RATE_LIMIT_LIMIT).and_then(|v| u32::try_from(v).ok()),
        remaining: number(RATE_LIMIT_REMAINING).and_then(|v| u32::try_from(v).ok()),
        reset_at: number(RATE_LIMIT_RESET).and_then(|v| Utc.timestamp_opt(v, 0).single()),
    }
}

/// Wait requested by a 429 response.
///
/// `Retry-After` (delta seconds) wins; otherwise the wait runs until
/// `x-rate-limit-reset`, measured from `now`. A reset that already passed
/// gives no hint, so the caller's default wait applies.
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let explicit = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    explicit.or_else(|| {
        rate_limit_info(headers)
            .reset_in(now)
            .filter(|wait| !wait.is_zero())
    })
}

/// Fails with a cancellation error if `cancel` has fired.
pub fn ensure_not_cancelled(cancel: Option<&CancellationToken>, what: &str) -> TwitterResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(TwitterError::cancelled(what.to_string())),
        _ => Ok(()),
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(
    delay: Duration,
    cancel: Option<&CancellationToken>,
    what: &str,
) -> TwitterResult<()> {
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => Err(TwitterError::cancelled(what.to_string())),
                _ = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ApiErrorDetail, NetworkError, ValidationError};
    use reqwest::header::HeaderValue;

    fn rate_limited(retry_after: Option<Duration>) -> TwitterError {
        TwitterError::RateLimit(RateLimitError::RateLimited {
            detail: ApiErrorDetail::new(429, "Too Many Requests"),
            retry_after,
            rate_limit: None,
        })
    }

    fn network() -> TwitterError {
        TwitterError::Network(NetworkError::ConnectionFailed("reset".to_string()))
    }

    #[test]
    fn test_rate_limit_budget() {
        let config = RetryConfig::default();
        let mut state = RetryState::new(&config, true);

        let error = rate_limited(Some(Duration::from_secs(7)));
        for _ in 0..3 {
            assert_eq!(state.next_delay(&error), Some(Duration::from_secs(7)));
        }
        assert_eq!(state.next_delay(&error), None);

        match state.finish(error) {
            TwitterError::RateLimit(RateLimitError::RateLimitExceeded { retries, .. }) => {
                assert_eq!(retries, 3)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_default_wait() {
        let config = RetryConfig::default();
        let mut state = RetryState::new(&config, true);
        assert_eq!(
            state.next_delay(&rate_limited(None)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_network_budget() {
        let config = RetryConfig {
            jitter: 0.0,
            ..Default::default()
        };
        let mut state = RetryState::new(&config, true);
        assert_eq!(state.next_delay(&network()), Some(Duration::from_secs(1)));
        assert_eq!(state.next_delay(&network()), None);
        assert_eq!(state.retries(), 1);
        assert!(matches!(state.finish(network()), TwitterError::Network(_)));
    }

    #[test]
    fn test_network_not_retried_when_not_idempotent() {
        let config = RetryConfig::default();
        let mut state = RetryState::new(&config, false);
        assert_eq!(state.next_delay(&network()), None);

        // 429 means the server did not act on the request.
        assert!(state.next_delay(&rate_limited(None)).is_some());
    }

    #[test]
    fn test_other_errors_not_retried() {
        let config = RetryConfig::default();
        let mut state = RetryState::new(&config, true);
        let error =
            TwitterError::Validation(ValidationError::Api(ApiErrorDetail::new(400, "bad")));
        assert_eq!(state.next_delay(&error), None);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = config.network_backoff();
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_retry_after_headers() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from_str(&(now.timestamp() + 90).to_string()).unwrap(),
        );
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from_static("450"));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from_static("0"));
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(90)));

        let info = rate_limit_info(&headers);
        assert_eq!(info.limit, Some(450));
        assert_eq!(info.remaining, Some(0));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(12)));

        assert_eq!(retry_after(&HeaderMap::new(), now), None);
    }

    #[test]
    fn test_past_reset_gives_no_hint() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from_str(&(now.timestamp() - 10).to_string()).unwrap(),
        );
        assert_eq!(retry_after(&headers, now), None);

        headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from_str(&now.timestamp().to_string()).unwrap(),
        );
        assert_eq!(retry_after(&headers, now), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("0"));
        assert_eq!(retry_after(&headers, now), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel() {
        let token = CancellationToken::new();
        assert!(sleep_or_cancel(Duration::from_secs(5), Some(&token), "wait")
            .await
            .is_ok());

        token.cancel();
        let err = sleep_or_cancel(Duration::from_secs(3600), Some(&token), "wait")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(ensure_not_cancelled(Some(&token), "loop").is_err());
        assert!(ensure_not_cancelled(None, "loop").is_ok());
    }
}
