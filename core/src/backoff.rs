//! Single-retry backoff for 429 responses.
//!
//! A 429 is either a per-second throttle (retry after a short pause) or an
//! exhausted daily quota (give up). The daily-remaining header tells the two
//! apart. At most one extra attempt is made per request.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::config::ClientConfig;
use crate::error::{decode_envelope, ApiError};
use crate::http::{HttpExecutor, HttpRequest, HttpResponse};

const TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub pause: Duration,
    pub daily_remaining_header: String,
}

impl RateLimitPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            pause: config.rate_limit_pause(),
            daily_remaining_header: config.daily_remaining_header.clone(),
        }
    }

    /// Remaining daily calls reported by the response. `None` when the header
    /// is missing or not a number.
    pub fn daily_remaining(&self, response: &HttpResponse) -> Option<u64> {
        response
            .header(&self.daily_remaining_header)
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Execute `request`, retrying once after `policy.pause` if the server
/// throttles it while daily quota remains.
///
/// A 429 with a zero daily quota, or a 429 on the retry, becomes
/// `ApiError::RateLimited`. A missing quota header is treated as quota left.
pub fn send_with_backoff<E>(
    executor: &mut E,
    policy: &RateLimitPolicy,
    request: &HttpRequest,
) -> Result<HttpResponse, ApiError>
where
    E: HttpExecutor + ?Sized,
{
    let response = executor.execute(request)?;
    if response.status != TOO_MANY_REQUESTS {
        return Ok(response);
    }

    let remaining = policy.daily_remaining(&response);
    if remaining == Some(0) {
        return Err(rate_limited(&response, remaining));
    }

    warn!(
        method = request.method.as_str(),
        path = %request.path,
        daily_remaining = ?remaining,
        pause_ms = policy.pause.as_millis() as u64,
        "rate limited, retrying once"
    );
    if !policy.pause.is_zero() {
        thread::sleep(policy.pause);
    }

    let retry = executor.execute(request)?;
    if retry.status == TOO_MANY_REQUESTS {
        return Err(rate_limited(&retry, policy.daily_remaining(&retry)));
    }
    Ok(retry)
}

fn rate_limited(response: &HttpResponse, daily_remaining: Option<u64>) -> ApiError {
    let message = decode_envelope(&response.body)
        .map(|envelope| envelope.message)
        .unwrap_or_else(|| response.body.clone());
    ApiError::RateLimited {
        daily_remaining,
        message,
    }
}
