//! Error classification logic

use crate::Error;

/// Why a candidate attempt failed, as far as the fallback loop is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429 or a message that reads like throttling.
    RateLimited,
    /// Upstream 400/404: model unknown, decommissioned or misconfigured.
    ModelUnavailable,
    /// Stream ended without text. Treated like throttling, see [`FailureKind::is_retryable`].
    EmptyResponse,
    /// Caller went away. Not a provider failure.
    Cancelled,
    /// Anything else: authentication, malformed responses, server faults.
    Fatal,
}

impl FailureKind {
    /// Whether the next candidate should be tried.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::RateLimited | FailureKind::ModelUnavailable | FailureKind::EmptyResponse
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ModelUnavailable => "model_unavailable",
            FailureKind::EmptyResponse => "empty_response",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Fatal => "fatal",
        }
    }
}

/// Phrases upstreams use when they throttle without a usable status code.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "rate limited",
    "too many requests",
    "429",
    "resource_exhausted",
    "quota exceeded",
];

pub fn is_rate_limit_message(message: &str) -> bool {
    let m = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| m.contains(marker))
}

/// Classify an attempt error.
pub fn classify_error(error: &Error) -> FailureKind {
    match error {
        Error::Cancelled => FailureKind::Cancelled,
        Error::EmptyResponse { .. } => FailureKind::EmptyResponse,
        Error::Remote { status: 429, .. } => FailureKind::RateLimited,
        Error::Remote { status: 400 | 404, .. } => FailureKind::ModelUnavailable,
        Error::Remote { message, .. } if is_rate_limit_message(message) => {
            FailureKind::RateLimited
        }
        Error::Exhausted { .. } => FailureKind::RateLimited,
        other => {
            if is_rate_limit_message(&other.to_string()) {
                FailureKind::RateLimited
            } else {
                FailureKind::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16, message: &str) -> Error {
        Error::Remote {
            provider: "openrouter".to_string(),
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(classify_error(&remote(429, "slow down")), FailureKind::RateLimited);
        assert_eq!(classify_error(&remote(404, "No endpoints found")), FailureKind::ModelUnavailable);
        assert_eq!(classify_error(&remote(400, "invalid model")), FailureKind::ModelUnavailable);
        assert_eq!(classify_error(&remote(401, "No auth credentials found")), FailureKind::Fatal);
        assert_eq!(classify_error(&remote(500, "Internal error")), FailureKind::Fatal);
    }

    #[test]
    fn test_rate_limit_message_with_other_status() {
        let e = remote(502, "google/gemini-2.0-flash-exp:free is temporarily rate-limited upstream");
        assert_eq!(classify_error(&e), FailureKind::RateLimited);
    }

    #[test]
    fn test_generate_is_not_rate() {
        // "generate" contains "rate"; only real throttling phrases count.
        assert!(!is_rate_limit_message("failed to generate content"));
        assert!(is_rate_limit_message("Too Many Requests"));
    }

    #[test]
    fn test_empty_and_cancelled() {
        let empty = Error::EmptyResponse {
            model: "m".to_string(),
        };
        assert_eq!(classify_error(&empty), FailureKind::EmptyResponse);
        assert!(FailureKind::EmptyResponse.is_retryable());

        assert_eq!(classify_error(&Error::Cancelled), FailureKind::Cancelled);
        assert!(!FailureKind::Cancelled.is_retryable());
        assert!(!FailureKind::Fatal.is_retryable());
    }
}
