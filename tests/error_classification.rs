//! Tests for failure classification driving the fallback loop

use verse_gateway::client::{classify_error, FailureKind};
use verse_gateway::transport::TransportError;
use verse_gateway::{Error, ErrorContext};

fn remote(status: u16, message: &str) -> Error {
    Error::Remote {
        provider: "openrouter".to_string(),
        status,
        message: message.to_string(),
    }
}

#[test]
fn test_retryable_failures() {
    let retryable = vec![
        remote(429, "Rate limit exceeded: free-models-per-min"),
        remote(404, "No endpoints found for google/gemini-2.0-flash-exp:free"),
        remote(400, "google/gemini-flash-1.5-8b-exp is not a valid model ID"),
        remote(503, "Provider is rate limited, please retry"),
        remote(500, "RESOURCE_EXHAUSTED: quota exceeded"),
        Error::EmptyResponse {
            model: "meta-llama/llama-3.1-8b-instruct:free".to_string(),
        },
    ];

    for e in retryable {
        assert!(
            classify_error(&e).is_retryable(),
            "Error '{}' should be retryable",
            e
        );
    }
}

#[test]
fn test_fatal_failures() {
    let fatal = vec![
        remote(401, "No auth credentials found"),
        remote(402, "Insufficient credits"),
        remote(500, "Internal Server Error"),
        remote(502, "failed to generate content"),
        Error::Transport(TransportError::Other("connection reset".to_string())),
        Error::configuration_with_context("missing key", ErrorContext::new()),
    ];

    for e in fatal {
        assert_eq!(
            classify_error(&e),
            FailureKind::Fatal,
            "Error '{}' should be fatal",
            e
        );
    }
}

#[test]
fn test_cancellation_is_not_a_provider_failure() {
    let kind = classify_error(&Error::Cancelled);
    assert_eq!(kind, FailureKind::Cancelled);
    assert!(!kind.is_retryable());
}

#[test]
fn test_kind_labels() {
    assert_eq!(FailureKind::RateLimited.as_str(), "rate_limited");
    assert_eq!(FailureKind::ModelUnavailable.as_str(), "model_unavailable");
    assert_eq!(FailureKind::EmptyResponse.as_str(), "empty_response");
}
