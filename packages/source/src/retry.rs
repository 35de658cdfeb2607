//! HTTP retry helpers for transient errors.
//!
//! Adapters call [`send_json`] or [`send_text`] instead of
//! `reqwest::RequestBuilder::send()` directly, passing a [`RetryPolicy`].
//! Most providers run without retries (a failing source is simply reported
//! as `Error` by the health monitor and tried again on the next scheduled
//! run); the Grist spreadsheet API is flaky enough to warrant a few fixed
//! retries. Total retry time stays bounded so a stalled provider cannot
//! block the run.

use std::time::Duration;

use crate::SourceError;

/// How a request should be retried on transient failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Number of additional attempts after the first one.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub const NONE: Self = Self {
        retries: 0,
        delay: Duration::ZERO,
    };

    /// `retries` additional attempts with a fixed delay in seconds.
    #[must_use]
    pub const fn fixed(retries: u32, delay_secs: u64) -> Self {
        Self {
            retries,
            delay: Duration::from_secs(delay_secs),
        }
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// Retries on connection errors, timeouts, HTTP 429 and HTTP 5xx. Other
/// 4xx statuses are permanent and fail immediately.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all attempts, the
/// server returns a non-retryable status, or the body is not valid JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let text = send_text(policy, build_request).await?;
    serde_json::from_str(&text).map_err(SourceError::Json)
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// Same retry behaviour as [`send_json`].
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all attempts or the
/// server returns a non-retryable status.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: RetryPolicy, build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=policy.retries {
        if attempt > 0 {
            log::warn!("  retry {attempt}/{} in {:?}...", policy.retries, policy.delay);
            tokio::time::sleep(policy.delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) => {
                if is_transient(&e) && attempt < policy.retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
        };

        let status = response.status();

        // 429 and 5xx are worth retrying; other 4xx are permanent.
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if attempt < policy.retries {
                log::warn!("  HTTP {status}");
                last_error = Some(SourceError::provider(format!("HTTP {status}")));
                continue;
            }
            return Err(SourceError::provider(format!(
                "HTTP {status} after {} retries",
                policy.retries
            )));
        }
        if status.is_client_error() {
            return Err(SourceError::provider(format!("HTTP {status}")));
        }

        match response.text().await {
            Ok(text) => return Ok(text),
            Err(e) => {
                if attempt < policy.retries {
                    log::warn!("  body read failed: {e}");
                    last_error = Some(SourceError::Http(e));
                    continue;
                }
                return Err(SourceError::Http(e));
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| SourceError::provider("request failed after all retries")))
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
