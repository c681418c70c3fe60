//! Shared error handling for the upstream HTTP clients.
//!
//! Both clients funnel failures through [`ApiError`] so the retry loop can
//! classify them uniformly, then convert into [`LookoutError`] at the trait
//! boundary.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LookoutError;

/// Generic API error produced by either provider.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code, if the server answered
    pub status: Option<StatusCode>,
    /// Retry-After header value in seconds, if present
    pub retry_after: Option<u64>,
    pub message: String,
    /// Provider name for context ("Sentry", "ClickUp")
    pub provider: &'static str,
    /// Connection failure or timeout before any response
    pub network: bool,
}

impl ApiError {
    pub fn new(message: impl Into<String>, provider: &'static str) -> Self {
        Self {
            status: None,
            retry_after: None,
            message: message.into(),
            provider,
            network: false,
        }
    }

    pub fn with_status(
        message: impl Into<String>,
        provider: &'static str,
        status: StatusCode,
    ) -> Self {
        Self {
            status: Some(status),
            ..Self::new(message, provider)
        }
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Classify a reqwest failure. Connect errors and timeouts are retryable.
    pub fn from_reqwest(err: reqwest::Error, provider: &'static str) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self {
            status: err.status(),
            retry_after: None,
            message,
            provider,
            network: err.is_timeout() || err.is_connect(),
        }
    }

    /// Build an error from a non-2xx response, keeping a bounded body excerpt.
    pub async fn from_response(response: reqwest::Response, provider: &'static str) -> Self {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(200).collect();

        let message = if excerpt.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", excerpt.trim())
        };

        let mut err = Self::with_status(message, provider, status);
        err.retry_after = retry_after;
        err
    }

    pub fn is_transient(&self) -> bool {
        if self.network {
            return true;
        }
        self.status.is_some_and(|s| s.is_server_error())
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(StatusCode::NOT_FOUND)
    }

    /// Server-requested delay for rate-limited responses.
    pub fn get_retry_after(&self) -> Option<Duration> {
        if !self.is_rate_limited() {
            return None;
        }
        self.retry_after.map(Duration::from_secs)
    }

    /// Convert, mapping 404 to `NotFound` with `what` as the message.
    pub fn not_found_as(self, what: impl FnOnce() -> String) -> LookoutError {
        if self.is_not_found() {
            LookoutError::NotFound(what())
        } else {
            self.into()
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} API error: {}", self.provider, self.message)
    }
}

impl From<ApiError> for LookoutError {
    fn from(error: ApiError) -> Self {
        LookoutError::Transport {
            provider: error.provider,
            status: error.status.map(|s| s.as_u16()),
            message: error.message,
        }
    }
}
